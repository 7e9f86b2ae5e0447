//! Redis-backed counter store.
//!
//! Counting runs inside a Lua script so that the existence check, the
//! initialization with a TTL, and the increment are applied by Redis as one
//! step. Two round trips (GET then SET/INCR) would let concurrent callers both
//! see an empty key and lose increments.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{error, info, trace};

use super::backend::CounterStore;
use crate::error::{Result, SluiceError};

/// Increment KEYS[1], creating it at 1 with a PX expiry of ARGV[1] if absent.
const INCREMENT_SCRIPT: &str = r#"
local current = redis.call("GET", KEYS[1])
if not current then
    redis.call("SET", KEYS[1], 1, "PX", ARGV[1])
    return 1
end
return redis.call("INCR", KEYS[1])
"#;

/// Value stored for a block marker.
const MARKER_VALUE: &str = "1";

/// A [`CounterStore`] backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    increment: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis, e.g. `redis://127.0.0.1:6379`.
    ///
    /// The connection manager reconnects on its own after a dropped connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis");

        Ok(Self {
            conn,
            increment: Script::new(INCREMENT_SCRIPT),
        })
    }
}

/// Redis expiries are whole milliseconds and must be positive.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_with_init(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .increment
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                error!(key, error = %e, "Increment script failed");
                SluiceError::from(e)
            })?;

        trace!(key, count, "Incremented counter");
        Ok(count)
    }

    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, MARKER_VALUE, ttl_millis(ttl))
            .await
            .map_err(|e| {
                error!(key, error = %e, "Failed to set marker");
                SluiceError::from(e)
            })
    }

    async fn get(&self, key: &str) -> Result<String> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| {
            error!(key, error = %e, "Failed to read key");
            SluiceError::from(e)
        })?;

        value.ok_or_else(|| SluiceError::NotFound(key.to_string()))
    }
}
