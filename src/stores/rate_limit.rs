use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::warn;

/// Per-identity request limiter over a fixed window.
///
/// Fail-open: if the backing store cannot be reached the request is allowed
/// and a warning logged, so a Redis outage degrades the service instead of
/// taking it down.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Whether `identity` may make another request right now.
    async fn allow(&self, identity: &str) -> bool;
}

/// Production limiter on a Redis `INCR` counter with an `EXPIRE` window.
///
/// The window starts when the counter is created (first `INCR` answers 1)
/// and correctness relies on the atomicity of those two commands; there is
/// no client-side locking.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    max_requests: u32,
    window: Duration,
}

impl RedisRateLimiter {
    /// Creates a new `RedisRateLimiter`.
    ///
    /// # Arguments
    ///
    /// * `conn` - An established Redis connection.
    /// * `max_requests` - Requests allowed per identity per window.
    /// * `window` - The window length.
    pub fn new(conn: ConnectionManager, max_requests: u32, window: Duration) -> Self {
        Self {
            conn,
            max_requests,
            window,
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, identity: &str) -> bool {
        let key = format!("rate_limit:ical:{}", identity);

        let count: i64 = match redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut self.conn.clone())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("⚠️ Rate limit INCR failed, allowing request: {}", e);
                return true;
            }
        };

        if count == 1 {
            let result: redis::RedisResult<()> = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.window.as_secs())
                .query_async(&mut self.conn.clone())
                .await;
            if let Err(e) = result {
                warn!("⚠️ Rate limit EXPIRE failed, window may not reset: {}", e);
            }
        }

        count <= self.max_requests as i64
    }
}

/// Limiter used when no Redis is configured: everything is allowed.
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn allow(&self, _identity: &str) -> bool {
        true
    }
}

#[cfg(test)]
pub use mock::MockRateLimiter;
