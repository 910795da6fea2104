//! Shared Redis handle.
//!
//! One [`RedisPool`] per process carries both the audit stream writes and
//! the notification publishes. The pub/sub relay opens its own dedicated
//! connection, since a subscribed connection cannot run other commands.

use redis::aio::ConnectionManager;
use redis::IntoConnectionInfo;
use thiserror::Error;
use tracing::debug;

/// Failures of the Redis-backed audit store and notification transport.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Redis unavailable: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Notification payload not encodable: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RedisResult<T> = Result<T, RedisError>;

/// Multiplexed connection that reconnects on its own. Cloning is cheap and
/// every operation works on its own clone.
pub type RedisPool = ConnectionManager;

/// Connect to `redis_url` (`redis://host:port/db`). Fails fast on a URL the
/// client cannot parse and on a server that refuses the first connection.
pub async fn init_pool(redis_url: &str) -> RedisResult<RedisPool> {
    let info = redis_url.into_connection_info()?;
    debug!(addr = %info.addr, db = info.redis.db, "Opening Redis connection");
    let client = redis::Client::open(info)?;
    Ok(ConnectionManager::new(client).await?)
}
