use tandem_auth::AuthError;
use thiserror::Error;

/// Errors raised talking to Redis.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create Redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("failed to get Redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("unexpected compare-and-swap reply: {0}")]
    UnexpectedReply(i64),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::storage(e.to_string())
    }
}
