use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use http::HeaderName;
use zeroize::{Zeroize, Zeroizing};

/// Default cache lifetime for scraped record sets, in hours.
const DEFAULT_CACHE_TTL_HOURS: i64 = 6;
/// Default request budget per identity per window.
const DEFAULT_RATE_LIMIT_MAX: u32 = 30;
/// Default rate-limit window, in seconds.
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// The application's configuration, loaded once at startup and immutable
/// afterwards. Every component receives it (or the piece it needs) at
/// construction time.
#[derive(Clone)]
pub struct Config {
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The public host (no scheme) used when building subscription links.
    pub host: String,
    /// The AES-256-GCM key that seals credential tokens.
    pub enckey: Zeroizing<Vec<u8>>,
    /// The URL of the Redis server. `None` disables rate limiting and the
    /// response cache.
    pub redis_url: Option<String>,
    /// How long scraped record sets stay cached.
    pub cache_ttl: Duration,
    /// A trusted header carrying the real client IP, if the service sits
    /// behind a reverse proxy.
    pub ip_header: Option<HeaderName>,
    /// Requests allowed per identity per window.
    pub rate_limit_max: u32,
    /// The rate-limit window.
    pub rate_limit_window: Duration,
    /// Path to the schedule configuration file (terms, dates, tweaks).
    pub schedule_path: String,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// Any invalid value is a fatal startup error, the service must not run
    /// in a half-configured state.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut enckey_hex = env::var("ENCKEY")
            .context("ENCKEY must be set (generate with: openssl rand -hex 32)")?;

        let enckey = parse_enckey(&enckey_hex)?;
        enckey_hex.zeroize();

        let host = env::var("HOST")
            .context("HOST must be set (public host used in subscription links)")?;

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:3000")?;

        let cache_ttl = parse_cache_ttl(
            &env::var("CACHE_TTL_HOURS").unwrap_or_else(|_| "0".to_string()),
        )?;

        let ip_header = match env::var("IP_HEADER") {
            Ok(name) if !name.is_empty() => Some(parse_ip_header(&name)?),
            _ => None,
        };

        let rate_limit_max = env::var("RATE_LIMIT_MAX")
            .unwrap_or_else(|_| DEFAULT_RATE_LIMIT_MAX.to_string())
            .parse()
            .context("Invalid RATE_LIMIT_MAX")?;

        let rate_limit_window_secs: u64 = env::var("RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| DEFAULT_RATE_LIMIT_WINDOW_SECS.to_string())
            .parse()
            .context("Invalid RATE_LIMIT_WINDOW_SECS")?;

        Ok(Self {
            bind_addr,
            host,
            enckey: Zeroizing::new(enckey),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            cache_ttl,
            ip_header,
            rate_limit_max,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            schedule_path: env::var("SCHEDULE_CONFIG")
                .unwrap_or_else(|_| "configs/schedule.json".to_string()),
        })
    }
}

/// Decodes and validates the token encryption key.
fn parse_enckey(hex_key: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(hex_key).context("ENCKEY must be valid hexadecimal")?;
    if bytes.len() != 32 {
        anyhow::bail!("ENCKEY must be exactly 32 bytes (64 hex characters)");
    }
    Ok(bytes)
}

/// Parses `CACHE_TTL_HOURS`. Zero means "use the default", a negative value
/// is a configuration error.
fn parse_cache_ttl(raw: &str) -> Result<Duration> {
    let hours: i64 = raw.parse().context("Invalid CACHE_TTL_HOURS")?;
    if hours < 0 {
        anyhow::bail!("CACHE_TTL_HOURS must not be negative");
    }
    let hours = if hours == 0 { DEFAULT_CACHE_TTL_HOURS } else { hours };
    Ok(Duration::from_secs(hours as u64 * 3600))
}

/// Validates the trusted client-IP header name.
fn parse_ip_header(name: &str) -> Result<HeaderName> {
    name.parse::<HeaderName>()
        .with_context(|| format!("IP_HEADER '{}' is not a valid header name", name))
}
