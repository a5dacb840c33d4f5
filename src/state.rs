use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::crypto::token::TokenCodec;
use crate::schedule::Schedule;
use crate::services::feed::FeedService;
use crate::services::portal::PortalClient;
use crate::services::sso::SsoClient;
use crate::stores::cache::{NoopResponseCache, RedisResponseCache, ResponseCache};
use crate::stores::rate_limit::{NoopRateLimiter, RateLimiter, RedisRateLimiter};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// The credential token codec.
    pub codec: TokenCodec,
    /// The per-client request limiter.
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// The feed builder (scraping, caching, single-flight).
    pub feed: Arc<FeedService>,
    /// The term calendar configuration.
    pub schedule: Arc<Schedule>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// With `REDIS_URL` set, the store is probed with a PING and a dead store
    /// aborts startup; without it the service runs with caching and rate
    /// limiting disabled.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let schedule = Arc::new(Schedule::load(&config.schedule_path)?);

        let codec = TokenCodec::new(&config.enckey)?;
        tracing::info!("🔐 Token codec initialized");

        let (cache, rate_limiter): (Arc<dyn ResponseCache>, Arc<dyn RateLimiter>) =
            match &config.redis_url {
                Some(url) => {
                    let client =
                        redis::Client::open(url.as_str()).context("invalid REDIS_URL")?;
                    let mut conn = ConnectionManager::new(client)
                        .await
                        .context("failed to connect to Redis")?;
                    let pong: String = redis::cmd("PING")
                        .query_async(&mut conn)
                        .await
                        .context("Redis did not answer PING")?;
                    tracing::info!("✅ Redis Connection Manager initialized ({})", pong);
                    (
                        Arc::new(RedisResponseCache::new(conn.clone())),
                        Arc::new(RedisRateLimiter::new(
                            conn,
                            config.rate_limit_max,
                            config.rate_limit_window,
                        )),
                    )
                }
                None => {
                    tracing::warn!(
                        "⚠️ REDIS_URL not set, response caching and rate limiting are disabled"
                    );
                    (Arc::new(NoopResponseCache), Arc::new(NoopRateLimiter))
                }
            };

        let feed = Arc::new(FeedService::new(
            SsoClient::new(),
            PortalClient::new(),
            cache,
            config.cache_ttl,
            schedule.clone(),
        ));
        tracing::info!("✅ Feed service initialized");

        Ok(AppState {
            config: Arc::new(config.clone()),
            codec,
            rate_limiter,
            feed,
            schedule,
        })
    }

    /// Builds a state around injected stores and stub portal clients.
    #[cfg(test)]
    pub fn for_tests(
        config: Config,
        cache: Arc<dyn ResponseCache>,
        rate_limiter: Arc<dyn RateLimiter>,
        sso: SsoClient,
        portal: PortalClient,
        schedule: Schedule,
    ) -> Self {
        let schedule = Arc::new(schedule);
        let codec = TokenCodec::new(&config.enckey).unwrap();
        let feed = Arc::new(FeedService::new(
            sso,
            portal,
            cache,
            config.cache_ttl,
            schedule.clone(),
        ));
        AppState {
            config: Arc::new(config),
            codec,
            rate_limiter,
            feed,
            schedule,
        }
    }
}
