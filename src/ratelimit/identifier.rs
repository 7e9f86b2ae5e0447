//! Identifier resolution and store key generation.

use std::net::{IpAddr, SocketAddr};

/// Which configured limit applies to an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
    /// Caller identified by its network address
    Address,
    /// Caller identified by an API credential
    Credential,
}

impl LimitClass {
    /// Key namespace for this class.
    fn namespace(&self) -> &'static str {
        match self {
            LimitClass::Address => "ip",
            LimitClass::Credential => "key",
        }
    }
}

/// The key a rate limit is scoped to.
///
/// Two callers share a counting bucket only if they present the same address,
/// or the same credential. An address and a credential never share a bucket,
/// even when their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// The address or credential value
    pub value: String,
    /// The limit class this identifier belongs to
    pub class: LimitClass,
}

impl Identifier {
    pub fn address(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            class: LimitClass::Address,
        }
    }

    pub fn credential(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            class: LimitClass::Credential,
        }
    }

    /// Resolve the identifier for a request.
    ///
    /// A non-empty credential wins and is used verbatim. Otherwise the
    /// caller's address is used with any port stripped. No other
    /// normalization happens.
    pub fn resolve(remote_addr: &str, credential: Option<&str>) -> Self {
        match credential {
            Some(token) if !token.is_empty() => Self::credential(token),
            _ => Self::address(strip_port(remote_addr)),
        }
    }

    /// Store key of the request counter.
    pub fn counter_key(&self) -> String {
        format!("request:{}:{}", self.class.namespace(), self.value)
    }

    /// Store key of the block marker.
    pub fn block_key(&self) -> String {
        format!("block:{}:{}", self.class.namespace(), self.value)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Host portion of `host:port`, `[v6]:port`, or a bare address.
fn strip_port(addr: &str) -> &str {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        let host = match socket {
            SocketAddr::V4(_) => addr.rsplit_once(':').map(|(h, _)| h),
            SocketAddr::V6(_) => addr
                .rsplit_once(':')
                .map(|(h, _)| h.trim_start_matches('[').trim_end_matches(']')),
        };
        return host.unwrap_or(addr);
    }
    if addr.parse::<IpAddr>().is_ok() {
        return addr;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_address_strips_port() {
        let id = Identifier::resolve("127.0.0.1:12345", None);
        assert_eq!(id, Identifier::address("127.0.0.1"));
        assert_eq!(id.class, LimitClass::Address);
    }

    #[test]
    fn test_resolve_ipv6_address() {
        assert_eq!(Identifier::resolve("[::1]:8080", None).value, "::1");
        assert_eq!(Identifier::resolve("2001:db8::1", None).value, "2001:db8::1");
    }

    #[test]
    fn test_resolve_without_port() {
        assert_eq!(Identifier::resolve("10.0.0.7", None).value, "10.0.0.7");
        assert_eq!(Identifier::resolve("gateway.local:80", None).value, "gateway.local");
        assert_eq!(Identifier::resolve("unknown", None).value, "unknown");
    }

    #[test]
    fn test_credential_takes_precedence() {
        let id = Identifier::resolve("127.0.0.1:12345", Some("key-A"));
        assert_eq!(id, Identifier::credential("key-A"));
        assert_eq!(id.class, LimitClass::Credential);
    }

    #[test]
    fn test_empty_credential_falls_back_to_address() {
        let id = Identifier::resolve("127.0.0.1:12345", Some(""));
        assert_eq!(id, Identifier::address("127.0.0.1"));
    }

    #[test]
    fn test_credential_is_not_normalized() {
        let id = Identifier::resolve("127.0.0.1:1", Some(" Key-A "));
        assert_eq!(id.value, " Key-A ");
    }

    #[test]
    fn test_store_keys() {
        let id = Identifier::address("127.0.0.1");
        assert_eq!(id.counter_key(), "request:ip:127.0.0.1");
        assert_eq!(id.block_key(), "block:ip:127.0.0.1");

        let id = Identifier::credential("valid-api-key");
        assert_eq!(id.counter_key(), "request:key:valid-api-key");
        assert_eq!(id.block_key(), "block:key:valid-api-key");
    }

    #[test]
    fn test_address_and_credential_never_collide() {
        let address = Identifier::address("127.0.0.1");
        let credential = Identifier::credential("127.0.0.1");
        assert_ne!(address, credential);
        assert_ne!(address.counter_key(), credential.counter_key());
    }
}
