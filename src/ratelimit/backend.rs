//! Counter store trait for abstracting Redis and in-memory storage.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// An atomic key-value store with expiring keys.
///
/// The limiter is the only writer. Implementations must execute
/// `increment_with_init` as one indivisible step: two callers racing on the
/// same key can never both observe "absent", and no increment is lost.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, creating it at 1 with the given TTL if absent.
    ///
    /// Returns the value after the increment. An existing key keeps its TTL.
    async fn increment_with_init(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Set `key` to a marker value with the given TTL, replacing any previous entry.
    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Read `key`. Returns `SluiceError::NotFound` when it is absent or expired.
    async fn get(&self, key: &str) -> Result<String>;
}
