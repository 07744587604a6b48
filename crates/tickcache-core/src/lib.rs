//! # Tickcache Core
//!
//! Cached, rate-limited market data fetching for equities.
//!
//! ## Overview
//!
//! - **Canonical domain models** for symbols, price history, company info, quotes and
//!   technical indicators
//! - **Provider adapters** for Yahoo Finance (free) and Alpha Vantage (API key, quota-limited)
//! - **On-disk cache** with per-kind freshness and atomic writes
//! - **Rate limiter** tracking per-minute and per-day call budgets
//! - **Fetcher** orchestrating cache, budget, provider call and write-through
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Yahoo, Alpha Vantage) |
//! | [`cache`] | File-per-key JSON cache |
//! | [`catalog`] | Offline ticker lookup |
//! | [`circuit_breaker`] | Consecutive-failure breaker for upstream calls |
//! | [`clock`] | Injectable time source |
//! | [`config`] | Environment-driven configuration |
//! | [`domain`] | Domain models |
//! | [`error`] | Validation, config and fetch errors |
//! | [`fetcher`] | Cache-first orchestration |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider`] | Provider adapter contract |
//! | [`provider_policy`] | Static per-provider limits |
//! | [`rate_limit`] | Call budgets and pacing |
//! | [`source`] | Provider identifiers |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickcache_core::{Fetcher, FetcherConfig, Interval, Period};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = Fetcher::builder(FetcherConfig::from_env()?).build()?;
//!
//!     let history = fetcher
//!         .get_historical("AAPL", Period::OneMonth, Interval::OneDay)
//!         .await?;
//!     println!(
//!         "{} rows from {} (cache hit: {})",
//!         history.data.len(),
//!         history.provenance.provider,
//!         history.provenance.cache_hit
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use tickcache_core::FetchError;
//!
//! fn describe(error: &FetchError) -> &'static str {
//!     match error {
//!         FetchError::InvalidSymbol(_) | FetchError::InvalidParameters(_) => "fix the request",
//!         FetchError::RateLimitExceeded { .. } => "wait and retry",
//!         FetchError::ProviderUnavailable { .. } => "try another provider",
//!         FetchError::NoDataReturned { .. } => "nothing to show",
//!         FetchError::CacheCorrupt { .. } => "cache was repaired",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys come from the environment only and are never logged
//! - Request URLs are logged with the `apikey` parameter masked

pub mod adapters;
pub mod cache;
pub mod catalog;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod provider;
pub mod provider_policy;
pub mod rate_limit;
pub mod source;

// Adapter implementations
pub use adapters::{AlphaVantageAdapter, YahooAdapter};

// Caching
pub use cache::{
    CacheEntry, CacheError, CacheKey, CacheLookup, CacheMode, CachePayload, CacheStats,
    CacheStore, HistoryTable,
};

pub use catalog::SymbolMatch;

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use clock::{Clock, ManualClock, SystemClock};

pub use config::{FetcherConfig, FreshnessPolicy};

// Domain models
pub use domain::{
    CompanyInfo, Indicator, IndicatorPoint, IndicatorSeries, Interval, Period, PriceRow,
    PriceSeries, QualityIssue, Quote, SeriesType, Symbol, UtcDateTime,
};

// Error types
pub use error::{ConfigError, FetchError, ValidationError};

// Fetcher
pub use fetcher::{
    FetchOptions, FetchRequest, Fetched, Fetcher, FetcherBuilder, IndicatorRequest, Provenance,
    SourceStrategy, DEFAULT_TIME_PERIOD,
};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Provider contract
pub use provider::{
    CapabilitySet, Endpoint, HistoryQuery, IndicatorQuery, ProviderClient, ProviderFuture,
    SourceError, SourceErrorKind,
};

pub use provider_policy::{ProviderPolicy, QuotaPolicy};

// Rate limiting
pub use rate_limit::{Pacer, Permit, RateLimiter, RateUsage};

// Source identifiers
pub use source::ProviderId;
