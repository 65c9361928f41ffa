use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tandem_auth::{AuthResult, CredentialStore, StoreKey};

use crate::config::RedisConfig;
use crate::error::StoreError;

/// KEYS[1] = key
/// ARGV[1] = "1" if a current value is expected, ARGV[2] = expected value
/// ARGV[3] = "1" to write, "0" to delete, ARGV[4] = new value
/// ARGV[5] = TTL in milliseconds
const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current ~= ARGV[2] then
    return 0
  end
elseif current then
  return 0
end
if ARGV[3] == '1' then
  redis.call('SET', KEYS[1], ARGV[4], 'PX', ARGV[5])
else
  redis.call('DEL', KEYS[1])
end
return 1
"#;

/// Credential store backed by a Redis connection pool.
#[derive(Clone)]
pub struct RedisCredentialStore {
    pool: Pool,
    key_prefix: String,
    cas: Script,
}

impl std::fmt::Debug for RedisCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCredentialStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCredentialStore {
    /// Wraps an existing pool.
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
            cas: Script::new(COMPARE_AND_SWAP),
        }
    }

    /// Builds a pool from `config` and checks that Redis answers.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        tracing::info!(url = %config.url, "Connecting to Redis");

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let timeout = Duration::from_millis(config.timeout_ms);
        let pool_config = redis_config.pool.get_or_insert_with(Default::default);
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;
        let store = Self::new(pool, config.key_prefix.clone());
        store.ping_inner().await?;

        tracing::info!("Connected to Redis");
        Ok(store)
    }

    fn key(&self, key: &StoreKey) -> String {
        format!("{}{}", self.key_prefix, key.render())
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        Ok(self.pool.get().await?)
    }

    async fn ping_inner(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// PX rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn get(&self, key: &StoreKey) -> AuthResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(self.key(key)).await.map_err(StoreError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &StoreKey, value: &[u8], ttl: Duration) -> AuthResult<()> {
        let mut conn = self.conn().await?;
        conn.pset_ex::<_, _, ()>(self.key(key), value, ttl_millis(ttl))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> AuthResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(self.key(key)).await.map_err(StoreError::from)?;
        Ok(removed > 0)
    }

    async fn compare_and_swap(
        &self,
        key: &StoreKey,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
        ttl: Duration,
    ) -> AuthResult<bool> {
        let mut conn = self.conn().await?;
        let reply: i64 = self
            .cas
            .key(self.key(key))
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default())
            .arg(if new.is_some() { "1" } else { "0" })
            .arg(new.unwrap_or_default())
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::from)?;

        match reply {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StoreError::UnexpectedReply(other).into()),
        }
    }

    async fn ping(&self) -> AuthResult<()> {
        Ok(self.ping_inner().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}
