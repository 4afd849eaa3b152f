use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::aio::ConnectionManagerConfig;
use redis::Client;
use redis::RedisError;
use redis::Script;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;
use tracing::instrument;

use crate::error::StoreError;
use crate::traits::Store;
use crate::types::MAX_TTL;

// Deletes KEYS[1] only if it holds ARGV[1].
const DELETE_IF_EQ: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_timeout() || err.is_connection_dropped() || err.is_connection_refusal() {
            StoreError::Unavailable(err.to_string())
        }
        else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// [`Store`] over a Redis server, shared by every process connected to it.
///
/// Expiry is left to Redis. `set_if_absent` is `SET NX PX`, `delete_if_eq` a Lua script, both atomic server-side.
#[derive(Clone)]
pub struct RedisStore {
    conn:         ConnectionManager,
    delete_if_eq: Script,
}

impl RedisStore {
    /// Connect with short timeouts and a single reconnect attempt: a slow store must not stall the callers.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_config(
            url,
            ConnectionManagerConfig::new()
                .set_number_of_retries(1)
                .set_connection_timeout(Duration::from_millis(100))
                .set_response_timeout(Duration::from_millis(500)),
        )
        .await
    }

    pub async fn connect_with_config(url: &str, config: ConnectionManagerConfig) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager_with_config(config).await?;
        debug!("connected to redis at {url}");
        Ok(Self {
            conn,
            delete_if_eq: Script::new(DELETE_IF_EQ),
        })
    }

    fn ttl_millis(ttl: Duration) -> u64 {
        u64::try_from(ttl.min(MAX_TTL).as_millis()).unwrap_or(u64::MAX).max(1)
    }
}

#[async_trait]
impl Store for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET").arg(key).query_async::<Option<Vec<u8>>>(&mut conn).await?)
    }

    #[instrument(level = "trace", skip(self, value))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(Self::ttl_millis(ttl))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(true)
    }

    #[instrument(level = "trace", skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(Self::ttl_millis(ttl))
            .query_async::<Option<String>>(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    #[instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL").arg(key).query_async::<i64>(&mut conn).await?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, expected))]
    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed = self
            .delete_if_eq
            .key(key)
            .arg(expected)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}
