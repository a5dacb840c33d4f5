use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

/// Derives the cache key for one logical query.
///
/// The key is a blake3 fingerprint of the query's identifying fields, never
/// of the credential token, so cache entries cannot be correlated back to a
/// token and re-encoding a token never splits the cache.
pub fn query_fingerprint(kind: &str, stu_id: &str, year: &str, term_code: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_bytes());
    hasher.update(b"\x00");
    hasher.update(stu_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(year.as_bytes());
    hasher.update(b"\x00");
    hasher.update(term_code.as_bytes());
    format!("icalcache:{}:{}", kind, hasher.finalize().to_hex())
}

/// Memoizes serialized record sets per logical-query fingerprint.
///
/// Implementations degrade instead of failing: a broken read is a miss, a
/// broken write drops the entry. Callers populate entries only after a real
/// successful scrape.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Looks up a cached record set.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores a record set for `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration);
}

/// Production cache on Redis `SET EX` / `GET`.
pub struct RedisResponseCache {
    conn: ConnectionManager,
}

impl RedisResponseCache {
    /// Creates a new `RedisResponseCache` on an established connection.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self.conn.clone().get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ Cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(e) = self
            .conn
            .clone()
            .set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
        {
            warn!("⚠️ Cache write failed, entry dropped: {}", e);
        }
    }
}

/// Cache used when no Redis is configured: every lookup is a miss and
/// writes vanish.
pub struct NoopResponseCache;

#[async_trait]
impl ResponseCache for NoopResponseCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn put(&self, _key: &str, _value: &str, _ttl: Duration) {}
}

#[cfg(test)]
pub use mock::MockResponseCache;

#[cfg(test)]
mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    /// In-memory cache with real TTL expiry, plus a write counter so tests
    /// can assert exactly when entries get populated.
    #[derive(Default)]
    pub struct MockResponseCache {
        entries: Mutex<HashMap<String, (String, Instant)>>,
        puts: AtomicUsize,
    }

    impl MockResponseCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_count(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResponseCache for MockResponseCache {
        async fn get(&self, key: &str) -> Option<String> {
            let entries = self.entries.lock().unwrap();
            entries
                .get(key)
                .filter(|(_, deadline)| Instant::now() < *deadline)
                .map(|(value, _)| value.clone())
        }

        async fn put(&self, key: &str, value: &str, ttl: Duration) {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        }
    }
}
