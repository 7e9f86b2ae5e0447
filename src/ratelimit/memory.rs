//! In-process counter store.
//!
//! Entries live in a sharded concurrent map. Read-or-init-then-increment runs
//! while holding the shard's write lock, which gives the same all-or-nothing
//! guarantee as the Redis script. Expiry is tracked on the tokio clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::backend::CounterStore;
use crate::error::{Result, SluiceError};

/// Value stored for a block marker.
const MARKER_VALUE: u64 = 1;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Instant,
}

impl Entry {
    fn new(value: u64, ttl: Duration, now: Instant) -> Result<Self> {
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| SluiceError::Store(format!("ttl {:?} is out of range", ttl)))?;
        Ok(Self { value, expires_at })
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A [`CounterStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodically purge expired entries until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = self.len(), "Purged expired entries");
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_with_init(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let fresh = Entry::new(0, ttl, now)?;
        let mut entry = self.entries.entry(key.to_string()).or_insert(fresh);

        if entry.is_expired(now) {
            *entry = fresh;
        }
        entry.value += 1;

        trace!(key, value = entry.value, "Incremented counter");
        Ok(entry.value)
    }

    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let marker = Entry::new(MARKER_VALUE, ttl, Instant::now())?;
        self.entries.insert(key.to_string(), marker);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.to_string());

        value.ok_or_else(|| SluiceError::NotFound(key.to_string()))
    }
}
