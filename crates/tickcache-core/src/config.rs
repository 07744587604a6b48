//! Environment-driven fetcher configuration.

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::{ConfigError, Interval, Period};

const DEFAULT_CACHE_DIR: &str = "data/cache";

/// Maximum entry age per payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub history: Duration,
    pub intraday: Duration,
    pub info: Duration,
    pub quote: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            history: Duration::from_secs(24 * 60 * 60),
            intraday: Duration::from_secs(15 * 60),
            info: Duration::from_secs(7 * 24 * 60 * 60),
            quote: Duration::from_secs(5 * 60),
        }
    }
}

impl FreshnessPolicy {
    pub const fn for_history(&self, interval: Interval) -> Duration {
        if interval.is_intraday() {
            self.intraday
        } else {
            self.history
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    pub cache_dir: PathBuf,
    pub alphavantage_api_key: Option<String>,
    pub freshness: FreshnessPolicy,
    pub default_period: Period,
    pub default_interval: Interval,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            alphavantage_api_key: None,
            freshness: FreshnessPolicy::default(),
            default_period: Period::OneYear,
            default_interval: Interval::OneDay,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl Debug for FetcherConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherConfig")
            .field("cache_dir", &self.cache_dir)
            .field(
                "alphavantage_api_key",
                &self.alphavantage_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("freshness", &self.freshness)
            .field("default_period", &self.default_period)
            .field("default_interval", &self.default_interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FetcherConfig {
    /// Reads `TICKCACHE_*` variables from the process environment.
    ///
    /// The Alpha Vantage key falls back to `ALPHA_VANTAGE_API_KEY`. Unset
    /// variables keep their defaults; set but unparseable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let freshness = FreshnessPolicy {
            history: hours(env_var_parse(&lookup, "TICKCACHE_CACHE_TTL_HOURS", 24)?),
            intraday: minutes(env_var_parse(&lookup, "TICKCACHE_INTRADAY_TTL_MINUTES", 15)?),
            info: hours(env_var_parse::<u64>(&lookup, "TICKCACHE_INFO_TTL_DAYS", 7)?.saturating_mul(24)),
            quote: minutes(env_var_parse(&lookup, "TICKCACHE_QUOTE_TTL_MINUTES", 5)?),
        };

        let timeout_ms: u64 = env_var_parse(&lookup, "TICKCACHE_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "TICKCACHE_TIMEOUT_MS",
                value: String::from("0"),
                reason: String::from("timeout must be positive"),
            });
        }

        let alphavantage_api_key = lookup("TICKCACHE_ALPHAVANTAGE_API_KEY")
            .or_else(|| lookup("ALPHA_VANTAGE_API_KEY"))
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty());

        Ok(Self {
            cache_dir: lookup("TICKCACHE_CACHE_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map_or(defaults.cache_dir, PathBuf::from),
            alphavantage_api_key,
            freshness,
            default_period: env_var_parse(&lookup, "TICKCACHE_DEFAULT_PERIOD", defaults.default_period)?,
            default_interval: env_var_parse(
                &lookup,
                "TICKCACHE_DEFAULT_INTERVAL",
                defaults.default_interval,
            )?,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_alphavantage_key(mut self, key: impl Into<String>) -> Self {
        self.alphavantage_api_key = Some(key.into());
        self
    }

    pub fn with_freshness(mut self, freshness: FreshnessPolicy) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn env_var_parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(default);
    }
    trimmed.parse().map_err(|error: T::Err| ConfigError::InvalidValue {
        name,
        value: raw.clone(),
        reason: error.to_string(),
    })
}

const fn hours(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60 * 60))
}

const fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}
