//! Admission evaluator: counts requests per identifier and flags abusers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::backend::CounterStore;
use super::identifier::Identifier;
use crate::config::SluiceConfig;
use crate::error::{Result, SluiceError};

/// Timing settings for a [`Limiter`], fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Counting window; the TTL of a fresh request counter
    pub window: Duration,
    /// TTL of a block marker
    pub cooldown: Duration,
    /// Deadline for each store call
    pub store_timeout: Option<Duration>,
}

impl LimiterSettings {
    pub fn from_config(config: &SluiceConfig) -> Self {
        Self {
            window: config.limits.window(),
            cooldown: config.limits.cooldown(),
            store_timeout: config.store.timeout(),
        }
    }
}

/// Outcome of recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Requests seen for the identifier in the current window, this one included
    pub count: u64,
    /// The limit the count was compared against
    pub limit: u64,
    /// Whether `count <= limit`
    pub allowed: bool,
}

impl Admission {
    pub fn new(count: u64, limit: u64) -> Self {
        Self {
            count,
            limit,
            allowed: count <= limit,
        }
    }

    /// Requests left in the current window.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// Records requests and block markers in a [`CounterStore`].
///
/// The limiter holds no per-identifier state and takes no locks; mutual
/// exclusion between concurrent requests is left to the store's atomic
/// increment. Each operation is a single store call, never retried.
pub struct Limiter {
    store: Arc<dyn CounterStore>,
    settings: LimiterSettings,
}

impl Limiter {
    pub fn new(store: Arc<dyn CounterStore>, settings: LimiterSettings) -> Self {
        Self { store, settings }
    }

    /// Count one request for `identifier` and compare the new total to `limit`.
    pub async fn record_and_check(&self, identifier: &Identifier, limit: u64) -> Result<Admission> {
        let key = identifier.counter_key();
        let count = self
            .bounded(
                "increment",
                self.store.increment_with_init(&key, self.settings.window),
            )
            .await?;

        let admission = Admission::new(count, limit);
        info!(
            identifier = %identifier,
            count = admission.count,
            limit = admission.limit,
            "Request {}/{}",
            admission.count,
            admission.limit
        );
        Ok(admission)
    }

    /// Mark `identifier` as blocked for the cooldown. Re-blocking refreshes the TTL.
    pub async fn block(&self, identifier: &Identifier) -> Result<()> {
        let key = identifier.block_key();
        self.bounded(
            "block",
            self.store.set_with_expiry(&key, self.settings.cooldown),
        )
        .await?;

        debug!(
            identifier = %identifier,
            cooldown = ?self.settings.cooldown,
            "Block marker set"
        );
        Ok(())
    }

    /// Read the block marker for `identifier`.
    ///
    /// An absent marker is reported as `SluiceError::NotFound`, which callers
    /// must treat as "not blocked".
    pub async fn is_blocked(&self, identifier: &Identifier) -> Result<bool> {
        let key = identifier.block_key();
        let value = self.bounded("lookup", self.store.get(&key)).await?;
        Ok(value == "1")
    }

    /// Record a request and, when it goes over the limit, set the block marker.
    ///
    /// The decision is made from the count alone; an existing block marker
    /// does not deny a request that is within the limit. The marker is
    /// advisory, so a failed marker write is logged and the request is still
    /// denied on its count. Only a failed count is returned as an error.
    pub async fn check(&self, identifier: &Identifier, limit: u64) -> Result<Admission> {
        let admission = self.record_and_check(identifier, limit).await?;
        if !admission.allowed {
            warn!(
                identifier = %identifier,
                count = admission.count,
                limit = admission.limit,
                "Identifier over limit, blocking"
            );
            if let Err(err) = self.block(identifier).await {
                error!(
                    identifier = %identifier,
                    error = %err,
                    "Failed to set block marker, denying on count"
                );
            }
        }
        Ok(admission)
    }

    /// Apply the store deadline. A call that misses it is dropped, which
    /// cancels it, and reported as a store failure.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(deadline) = self.settings.store_timeout else {
            return call.await;
        };

        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                error!(operation, deadline = ?deadline, "Store call timed out");
                Err(SluiceError::Store(format!(
                    "{} timed out after {:?}",
                    operation, deadline
                )))
            }
        }
    }
}
