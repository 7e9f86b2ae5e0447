//! Admission gate: turns one inbound request into a decision.

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::LimitsConfig;
use crate::ratelimit::{Admission, Identifier, LimitClass, Limiter};

/// Request limits per identifier class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLimits {
    pub address: u64,
    pub credential: u64,
}

impl ClassLimits {
    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self {
            address: limits.ip_limit,
            credential: limits.token_limit,
        }
    }

    pub fn limit_for(&self, class: LimitClass) -> u64 {
        match class {
            LimitClass::Address => self.address,
            LimitClass::Credential => self.credential,
        }
    }
}

/// The outcome for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Within the limit; pass the request on
    Allowed(Admission),
    /// Over the limit; reject with "too many requests"
    Denied(Admission),
    /// The store failed; rejected with a server error (fail-closed)
    Errored,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }
}

/// Resolves the caller, asks the limiter, and applies the failure policy.
///
/// Store failures never admit a request: the gate is fail-closed.
pub struct AdmissionGate {
    limiter: Arc<Limiter>,
    limits: ClassLimits,
}

impl AdmissionGate {
    pub fn new(limiter: Arc<Limiter>, limits: ClassLimits) -> Self {
        Self { limiter, limits }
    }

    /// Evaluate a request from `remote_addr` carrying an optional credential.
    pub async fn evaluate(&self, remote_addr: &str, credential: Option<&str>) -> Decision {
        let identifier = Identifier::resolve(remote_addr, credential);
        let limit = self.limits.limit_for(identifier.class);

        match self.limiter.check(&identifier, limit).await {
            Ok(admission) if admission.allowed => {
                debug!(identifier = %identifier, count = admission.count, limit, "Request allowed");
                Decision::Allowed(admission)
            }
            Ok(admission) => {
                debug!(identifier = %identifier, count = admission.count, limit, "Request denied");
                Decision::Denied(admission)
            }
            Err(err) => {
                error!(
                    identifier = %identifier,
                    limit,
                    error = %err,
                    "Admission check failed, rejecting request"
                );
                Decision::Errored
            }
        }
    }
}
