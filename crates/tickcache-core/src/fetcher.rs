//! Cache-first fetch orchestration.
//!
//! Every request runs the same pipeline per candidate provider:
//!
//! 1. validate symbol and parameters (no I/O on failure)
//! 2. serve a fresh cache entry if one exists
//! 3. skip providers whose circuit breaker is open, then consume rate budget
//!    or fail with `RateLimitExceeded`
//! 4. call the provider under a timeout
//! 5. normalize and sanity-check the result
//! 6. write through to the cache (failures are logged, never returned)
//!
//! Identical cache keys are single-flighted: a second caller waits for the
//! first and then finds the freshly written entry.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::adapters::{AlphaVantageAdapter, YahooAdapter};
use crate::cache::{CacheError, CacheKey, CacheLookup, CacheMode, CachePayload, CacheStats, CacheStore};
use crate::catalog::{self, SymbolMatch};
use crate::clock::{system_clock, Clock};
use crate::config::{FetcherConfig, FreshnessPolicy};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::provider::{
    Endpoint, HistoryQuery, IndicatorQuery, ProviderClient, ProviderFuture, SourceError,
    SourceErrorKind,
};
use crate::provider_policy::ProviderPolicy;
use crate::rate_limit::{Pacer, Permit, RateLimiter, RateUsage};
use crate::{
    CompanyInfo, FetchError, Indicator, IndicatorSeries, Interval, Period, PriceSeries, ProviderId,
    Quote, SeriesType, Symbol, UtcDateTime, ValidationError,
};

/// Retry hint used when a provider throttles on its own side.
const PROVIDER_THROTTLE_RETRY: Duration = Duration::from_secs(60);

/// Bars per indicator window when the caller does not say.
pub const DEFAULT_TIME_PERIOD: u32 = 10;

/// Which providers a request may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStrategy {
    /// Only this provider.
    Strict(ProviderId),
    /// Each provider in order until one succeeds.
    Priority(Vec<ProviderId>),
}

impl Default for SourceStrategy {
    fn default() -> Self {
        Self::Strict(ProviderId::default())
    }
}

impl SourceStrategy {
    /// Providers to try, in order, without duplicates.
    pub fn chain(&self) -> Vec<ProviderId> {
        match self {
            Self::Strict(provider) => vec![*provider],
            Self::Priority(providers) => {
                let mut chain = Vec::with_capacity(providers.len());
                for provider in providers {
                    if !chain.contains(provider) {
                        chain.push(*provider);
                    }
                }
                chain
            }
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict(_))
    }
}

/// Price history request as supplied by a caller. The symbol stays raw until
/// the fetcher validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub period: Period,
    pub interval: Interval,
    pub strategy: SourceStrategy,
}

impl FetchRequest {
    pub fn new(symbol: impl Into<String>, period: Period, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            interval,
            strategy: SourceStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SourceStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Technical indicator request. Only Alpha Vantage computes indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRequest {
    pub symbol: String,
    pub indicator: Indicator,
    pub interval: Interval,
    pub time_period: u32,
    pub series_type: SeriesType,
}

impl IndicatorRequest {
    /// Daily bars, a ten-bar window over closes.
    pub fn new(symbol: impl Into<String>, indicator: Indicator) -> Self {
        Self {
            symbol: symbol.into(),
            indicator,
            interval: Interval::OneDay,
            time_period: DEFAULT_TIME_PERIOD,
            series_type: SeriesType::default(),
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_time_period(mut self, time_period: u32) -> Self {
        self.time_period = time_period;
        self
    }

    pub fn with_series_type(mut self, series_type: SeriesType) -> Self {
        self.series_type = series_type;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub cache_mode: CacheMode,
    /// Serve an expired cache entry instead of failing when the provider's
    /// budget is exhausted.
    pub allow_stale_on_limit: bool,
}

impl FetchOptions {
    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn allowing_stale(mut self) -> Self {
        self.allow_stale_on_limit = true;
        self
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub provider: ProviderId,
    pub cache_hit: bool,
    pub stale: bool,
    pub fetched_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fetched<T> {
    pub data: T,
    pub provenance: Provenance,
}

/// Payloads the fetcher knows how to cache and sanity-check.
trait Resource: Sized + Send + 'static {
    const ENDPOINT: Endpoint;

    fn to_payload(&self) -> CachePayload;

    fn from_payload(payload: CachePayload) -> Option<Self>;

    fn finish(self, symbol: &Symbol) -> Result<Self, FetchError>;
}

impl Resource for PriceSeries {
    const ENDPOINT: Endpoint = Endpoint::History;

    fn to_payload(&self) -> CachePayload {
        CachePayload::history(self)
    }

    fn from_payload(payload: CachePayload) -> Option<Self> {
        match payload {
            CachePayload::History(table) => table.to_series().ok(),
            CachePayload::Info(_) | CachePayload::Quote(_) | CachePayload::Indicator(_) => None,
        }
    }

    fn finish(self, symbol: &Symbol) -> Result<Self, FetchError> {
        let series = PriceSeries::normalized(
            self.symbol,
            self.period,
            self.interval,
            self.provider,
            self.rows,
        );
        if series.is_empty() {
            return Err(FetchError::NoDataReturned {
                symbol: symbol.to_string(),
            });
        }
        for issue in series.quality_issues() {
            warn!(symbol = %symbol, provider = %series.provider, issue = %issue, "price data quality issue");
        }
        Ok(series)
    }
}

impl Resource for CompanyInfo {
    const ENDPOINT: Endpoint = Endpoint::Info;

    fn to_payload(&self) -> CachePayload {
        CachePayload::Info(self.clone())
    }

    fn from_payload(payload: CachePayload) -> Option<Self> {
        match payload {
            CachePayload::Info(info) => Some(info),
            CachePayload::History(_) | CachePayload::Quote(_) | CachePayload::Indicator(_) => None,
        }
    }

    fn finish(self, symbol: &Symbol) -> Result<Self, FetchError> {
        if self.is_blank() {
            return Err(FetchError::NoDataReturned {
                symbol: symbol.to_string(),
            });
        }
        Ok(self)
    }
}

impl Resource for Quote {
    const ENDPOINT: Endpoint = Endpoint::Quote;

    fn to_payload(&self) -> CachePayload {
        CachePayload::Quote(self.clone())
    }

    fn from_payload(payload: CachePayload) -> Option<Self> {
        match payload {
            CachePayload::Quote(quote) => Some(quote),
            CachePayload::History(_) | CachePayload::Info(_) | CachePayload::Indicator(_) => None,
        }
    }

    fn finish(self, _symbol: &Symbol) -> Result<Self, FetchError> {
        Ok(self)
    }
}

impl Resource for IndicatorSeries {
    const ENDPOINT: Endpoint = Endpoint::Indicator;

    fn to_payload(&self) -> CachePayload {
        CachePayload::Indicator(self.clone())
    }

    fn from_payload(payload: CachePayload) -> Option<Self> {
        match payload {
            CachePayload::Indicator(series) => Some(series),
            CachePayload::History(_) | CachePayload::Info(_) | CachePayload::Quote(_) => None,
        }
    }

    fn finish(mut self, symbol: &Symbol) -> Result<Self, FetchError> {
        self.normalize();
        if self.is_empty() {
            return Err(FetchError::NoDataReturned {
                symbol: symbol.to_string(),
            });
        }
        Ok(self)
    }
}

/// One provider attempt, fully resolved before any I/O.
struct Attempt {
    provider: ProviderId,
    client: Arc<dyn ProviderClient>,
    key: CacheKey,
    max_age: Duration,
}

type FetchLockMap = Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>;

/// Cache-first market data fetcher. `Send + Sync`; share it behind `Arc`.
pub struct Fetcher {
    providers: BTreeMap<ProviderId, Arc<dyn ProviderClient>>,
    pacers: HashMap<ProviderId, Pacer>,
    cache: CacheStore,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    freshness: FreshnessPolicy,
    timeout: Duration,
    default_period: Period,
    default_interval: Interval,
    fetch_locks: FetchLockMap,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("cache_dir", &self.cache.dir())
            .field("freshness", &self.freshness)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    pub fn builder(config: FetcherConfig) -> FetcherBuilder {
        FetcherBuilder::new(config)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub const fn default_period(&self) -> Period {
        self.default_period
    }

    pub const fn default_interval(&self) -> Interval {
        self.default_interval
    }

    /// History from the default provider with default cache behavior.
    pub async fn get_historical(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Fetched<PriceSeries>, FetchError> {
        self.fetch_history(&FetchRequest::new(symbol, period, interval), FetchOptions::default())
            .await
    }

    #[instrument(skip(self, request), fields(symbol = %request.symbol, period = %request.period, interval = %request.interval))]
    pub async fn fetch_history(
        &self,
        request: &FetchRequest,
        options: FetchOptions,
    ) -> Result<Fetched<PriceSeries>, FetchError> {
        let symbol = Symbol::parse(&request.symbol)?;
        let query = HistoryQuery::new(symbol.clone(), request.period, request.interval);
        let max_age = self.freshness.for_history(request.interval);

        let query = &query;
        self.run(&symbol, &request.strategy, options, |provider| {
            let client = self.client_for(provider)?;
            if !client.supports(request.period, request.interval) {
                return Err(ValidationError::UnsupportedCombination {
                    provider,
                    period: request.period.to_string(),
                    interval: request.interval.to_string(),
                }
                .into());
            }
            Ok(Attempt {
                provider,
                client,
                key: CacheKey::history(&symbol, request.period, request.interval, provider),
                max_age,
            })
        }, move |client| Box::pin(async move { client.fetch_history(query).await }))
        .await
    }

    pub async fn get_info(&self, symbol: &str) -> Result<Fetched<CompanyInfo>, FetchError> {
        self.fetch_info(symbol, &SourceStrategy::default(), FetchOptions::default())
            .await
    }

    #[instrument(skip(self, strategy, options))]
    pub async fn fetch_info(
        &self,
        symbol: &str,
        strategy: &SourceStrategy,
        options: FetchOptions,
    ) -> Result<Fetched<CompanyInfo>, FetchError> {
        let symbol = &Symbol::parse(symbol)?;
        let max_age = self.freshness.info;

        self.run(symbol, strategy, options, |provider| {
            Ok(Attempt {
                provider,
                client: self.client_for(provider)?,
                key: CacheKey::info(symbol, provider),
                max_age,
            })
        }, move |client| Box::pin(async move { client.fetch_info(symbol).await }))
        .await
    }

    pub async fn get_quote(&self, symbol: &str) -> Result<Fetched<Quote>, FetchError> {
        self.fetch_quote(symbol, &SourceStrategy::default(), FetchOptions::default())
            .await
    }

    #[instrument(skip(self, strategy, options))]
    pub async fn fetch_quote(
        &self,
        symbol: &str,
        strategy: &SourceStrategy,
        options: FetchOptions,
    ) -> Result<Fetched<Quote>, FetchError> {
        let symbol = &Symbol::parse(symbol)?;
        let max_age = self.freshness.quote;

        self.run(symbol, strategy, options, |provider| {
            Ok(Attempt {
                provider,
                client: self.client_for(provider)?,
                key: CacheKey::quote(symbol, provider),
                max_age,
            })
        }, move |client| Box::pin(async move { client.fetch_quote(symbol).await }))
        .await
    }

    /// Indicator with default cache behavior.
    pub async fn get_technical_indicator(
        &self,
        symbol: &str,
        indicator: Indicator,
        interval: Interval,
        time_period: u32,
        series_type: SeriesType,
    ) -> Result<Fetched<IndicatorSeries>, FetchError> {
        let request = IndicatorRequest::new(symbol, indicator)
            .with_interval(interval)
            .with_time_period(time_period)
            .with_series_type(series_type);
        self.fetch_indicator(&request, FetchOptions::default()).await
    }

    #[instrument(skip(self, request, options), fields(symbol = %request.symbol, indicator = %request.indicator, interval = %request.interval))]
    pub async fn fetch_indicator(
        &self,
        request: &IndicatorRequest,
        options: FetchOptions,
    ) -> Result<Fetched<IndicatorSeries>, FetchError> {
        let symbol = Symbol::parse(&request.symbol)?;
        if request.time_period == 0 {
            return Err(ValidationError::InvalidTimePeriod.into());
        }
        let query = IndicatorQuery {
            symbol: symbol.clone(),
            indicator: request.indicator,
            interval: request.interval,
            time_period: request.time_period,
            series_type: request.series_type,
        };
        let max_age = self.freshness.for_history(request.interval);
        let strategy = SourceStrategy::Strict(ProviderId::Alphavantage);

        let query = &query;
        self.run(&symbol, &strategy, options, |provider| {
            let client = self.client_for(provider)?;
            if !client.supports_indicator(query.interval) {
                return Err(FetchError::InvalidParameters(format!(
                    "{provider} does not compute indicators on {} bars",
                    query.interval
                )));
            }
            Ok(Attempt {
                provider,
                client,
                key: CacheKey::indicator(query, provider),
                max_age,
            })
        }, move |client| Box::pin(async move { client.fetch_indicator(query).await }))
        .await
    }

    /// History for several symbols, each resolved independently. Keys are the
    /// caller's raw inputs.
    pub async fn get_multiple<S>(
        &self,
        symbols: &[S],
        period: Period,
        interval: Interval,
    ) -> BTreeMap<String, Result<Fetched<PriceSeries>, FetchError>>
    where
        S: AsRef<str>,
    {
        let mut results = BTreeMap::new();
        for raw in symbols {
            let raw = raw.as_ref();
            let result = self.get_historical(raw, period, interval).await;
            if let Err(error) = &result {
                debug!(symbol = raw, error = %error, "batch member failed");
            }
            results.insert(raw.to_owned(), result);
        }
        results
    }

    pub fn search_symbols(&self, query: &str, limit: usize) -> Vec<SymbolMatch> {
        catalog::search(query, limit)
    }

    /// Removes every cache entry, or only those of `symbol`.
    pub fn clear_cache(&self, symbol: Option<&Symbol>) -> Result<usize, CacheError> {
        let removed = match symbol {
            Some(symbol) => self.cache.clear_symbol(symbol)?,
            None => self.cache.clear()?,
        };
        info!(removed, symbol = ?symbol.map(Symbol::as_str), "cache cleared");
        Ok(removed)
    }

    pub fn cache_stats(&self) -> Result<CacheStats, CacheError> {
        self.cache.stats()
    }

    pub fn rate_usage(&self, provider: ProviderId) -> RateUsage {
        self.limiter.usage(provider)
    }

    fn client_for(&self, provider: ProviderId) -> Result<Arc<dyn ProviderClient>, FetchError> {
        match self.providers.get(&provider) {
            Some(client) => Ok(Arc::clone(client)),
            None if provider.requires_api_key() => {
                warn!(provider = %provider, "request needs an API key that is not configured");
                Err(FetchError::InvalidParameters(format!(
                    "{provider} requires an API key; set TICKCACHE_ALPHAVANTAGE_API_KEY"
                )))
            }
            None => Err(FetchError::InvalidParameters(format!(
                "{provider} is not configured"
            ))),
        }
    }

    /// Walks the strategy's provider chain. Per-provider failures fall through
    /// to the next candidate under `Priority`; the last error is returned.
    async fn run<'q, T, P, C>(
        &self,
        symbol: &Symbol,
        strategy: &SourceStrategy,
        options: FetchOptions,
        plan: P,
        call: C,
    ) -> Result<Fetched<T>, FetchError>
    where
        T: Resource,
        P: Fn(ProviderId) -> Result<Attempt, FetchError>,
        C: Fn(Arc<dyn ProviderClient>) -> ProviderFuture<'q, T>,
    {
        let chain = strategy.chain();
        if chain.is_empty() {
            return Err(FetchError::InvalidParameters(String::from(
                "provider priority list is empty",
            )));
        }

        let mut last_error = None;
        for provider in chain {
            let outcome = match plan(provider) {
                Ok(attempt) => self.attempt(symbol, attempt, options, &call).await,
                Err(error) => Err(error),
            };

            match outcome {
                Ok(fetched) => return Ok(fetched),
                Err(error) if strategy.is_strict() => return Err(error),
                Err(error) => {
                    debug!(symbol = %symbol, provider = %provider, error = %error, "provider attempt failed; trying next");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            FetchError::InvalidParameters(String::from("no provider could serve the request"))
        }))
    }

    async fn attempt<'q, T, C>(
        &self,
        symbol: &Symbol,
        attempt: Attempt,
        options: FetchOptions,
        call: &C,
    ) -> Result<Fetched<T>, FetchError>
    where
        T: Resource,
        C: Fn(Arc<dyn ProviderClient>) -> ProviderFuture<'q, T>,
    {
        if !attempt.client.capabilities().supports(T::ENDPOINT) {
            return Err(map_source_error(
                attempt.provider,
                symbol,
                SourceError::unsupported_endpoint(attempt.provider, T::ENDPOINT),
            ));
        }

        let lock = self.get_or_create_lock(attempt.key.as_str()).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.attempt_locked(symbol, &attempt, options, call).await
        };
        self.release_lock(attempt.key.as_str(), lock).await;
        outcome
    }

    /// Cache read, budget, provider call and write-through for one key. The
    /// caller holds the key's fetch lock.
    async fn attempt_locked<'q, T, C>(
        &self,
        symbol: &Symbol,
        attempt: &Attempt,
        options: FetchOptions,
        call: &C,
    ) -> Result<Fetched<T>, FetchError>
    where
        T: Resource,
        C: Fn(Arc<dyn ProviderClient>) -> ProviderFuture<'q, T>,
    {
        let Attempt {
            provider,
            client,
            key,
            max_age,
        } = attempt;
        let (provider, max_age) = (*provider, *max_age);

        let mut stale = None;
        if options.cache_mode.reads() {
            match self.cache.lookup(key) {
                CacheLookup::Hit(entry) => {
                    let fresh = self.cache.is_fresh(&entry, max_age);
                    let created_at = entry.created_at;
                    match T::from_payload(entry.payload) {
                        Some(data) if fresh => {
                            debug!(key = %key, "cache hit");
                            return Ok(Fetched {
                                data,
                                provenance: Provenance {
                                    provider,
                                    cache_hit: true,
                                    stale: false,
                                    fetched_at: created_at,
                                },
                            });
                        }
                        Some(data) => {
                            debug!(key = %key, created_at = %created_at, "cache entry expired");
                            stale = Some((data, created_at));
                        }
                        None => warn!(key = %key, "cache entry holds a different payload kind; ignoring"),
                    }
                }
                CacheLookup::Missing => debug!(key = %key, "cache miss"),
                CacheLookup::Corrupt(reason) => {
                    debug!(key = %key, reason = %reason, "corrupt cache entry treated as miss");
                }
            }
        }

        if let Err(error) = client.ready() {
            debug!(provider = %provider, error = %error, "provider is rejecting calls; budget untouched");
            return Err(map_source_error(provider, symbol, error));
        }

        if let Permit::Denied { retry_after } = self.limiter.try_acquire(provider) {
            return Self::stale_or(
                stale,
                provider,
                options,
                FetchError::RateLimitExceeded { retry_after },
            );
        }

        if let Some(pacer) = self.pacers.get(&provider) {
            pacer.ready().await;
        }

        info!(symbol = %symbol, provider = %provider, key = %key, "fetching from provider");
        let data = match self.call_with_timeout(provider, symbol, call(Arc::clone(client))).await {
            Ok(data) => data.finish(symbol)?,
            Err(error) => {
                if let FetchError::RateLimitExceeded { .. } = error {
                    return Self::stale_or(stale, provider, options, error);
                }
                return Err(error);
            }
        };

        let fetched_at = if options.cache_mode.writes() {
            self.write_through(key, &data)
        } else {
            self.clock.now()
        };

        Ok(Fetched {
            data,
            provenance: Provenance {
                provider,
                cache_hit: false,
                stale: false,
                fetched_at,
            },
        })
    }

    async fn call_with_timeout<T>(
        &self,
        provider: ProviderId,
        symbol: &Symbol,
        future: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, FetchError> {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(error)) => {
                warn!(symbol = %symbol, provider = %provider, error = %error, "provider call failed");
                Err(map_source_error(provider, symbol, error))
            }
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(symbol = %symbol, provider = %provider, timeout_ms, "provider call timed out");
                Err(FetchError::ProviderUnavailable {
                    provider,
                    cause: format!("timed out after {timeout_ms}ms"),
                })
            }
        }
    }

    /// Stores `data`; failures are logged and the fetch still succeeds.
    fn write_through<T: Resource>(&self, key: &CacheKey, data: &T) -> UtcDateTime {
        match self.cache.store(key, data.to_payload()) {
            Ok(entry) => {
                info!(key = %key, "cache entry stored");
                entry.created_at
            }
            Err(error) => {
                warn!(key = %key, error = %error, "cache write failed; returning fetched data");
                self.clock.now()
            }
        }
    }

    fn stale_or<T>(
        stale: Option<(T, UtcDateTime)>,
        provider: ProviderId,
        options: FetchOptions,
        error: FetchError,
    ) -> Result<Fetched<T>, FetchError> {
        match stale {
            Some((data, created_at)) if options.allow_stale_on_limit => {
                warn!(provider = %provider, error = %error, "serving stale cache entry");
                Ok(Fetched {
                    data,
                    provenance: Provenance {
                        provider,
                        cache_hit: true,
                        stale: true,
                        fetched_at: created_at,
                    },
                })
            }
            _ => Err(error),
        }
    }

    async fn get_or_create_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let locks = self.fetch_locks.read().await;
        if let Some(lock) = locks.get(key) {
            return Arc::clone(lock);
        }
        drop(locks);

        let mut locks = self.fetch_locks.write().await;
        Arc::clone(
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drops the map entry for `key` once no other caller holds or waits on it.
    async fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.fetch_locks.write().await;
        drop(lock);
        if locks
            .get(key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(key);
        }
    }
}

/// Maps an adapter failure onto the public taxonomy.
fn map_source_error(provider: ProviderId, symbol: &Symbol, error: SourceError) -> FetchError {
    match error.kind() {
        SourceErrorKind::NoData => FetchError::NoDataReturned {
            symbol: symbol.to_string(),
        },
        SourceErrorKind::RateLimited => FetchError::RateLimitExceeded {
            retry_after: PROVIDER_THROTTLE_RETRY,
        },
        SourceErrorKind::InvalidRequest | SourceErrorKind::UnsupportedEndpoint => {
            FetchError::InvalidParameters(error.message().to_owned())
        }
        SourceErrorKind::Unavailable | SourceErrorKind::Internal => FetchError::ProviderUnavailable {
            provider,
            cause: error.message().to_owned(),
        },
    }
}

/// Assembles a [`Fetcher`] from configuration plus optional overrides.
pub struct FetcherBuilder {
    config: FetcherConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    providers: Vec<Arc<dyn ProviderClient>>,
    clock: Option<Arc<dyn Clock>>,
    rate_limiter: Option<RateLimiter>,
    pacing: bool,
}

impl FetcherBuilder {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config,
            http_client: None,
            providers: Vec::new(),
            clock: None,
            rate_limiter: None,
            pacing: true,
        }
    }

    /// Transport for the built-in adapters.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Registers `provider`, replacing the built-in adapter with the same id.
    pub fn with_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Disables the minimum spacing between calls to free endpoints.
    pub fn without_pacing(mut self) -> Self {
        self.pacing = false;
        self
    }

    pub fn build(self) -> Result<Fetcher, CacheError> {
        let clock = self.clock.unwrap_or_else(system_clock);
        let cache = CacheStore::open_with_clock(&self.config.cache_dir, Arc::clone(&clock))?;
        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::with_clock(Arc::clone(&clock)));
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);

        let mut providers: BTreeMap<ProviderId, Arc<dyn ProviderClient>> = BTreeMap::new();
        providers.insert(
            ProviderId::Yahoo,
            Arc::new(
                YahooAdapter::with_http_client(Arc::clone(&http_client))
                    .with_clock(Arc::clone(&clock))
                    .with_timeout_ms(timeout_ms),
            ),
        );
        match &self.config.alphavantage_api_key {
            Some(api_key) => {
                providers.insert(
                    ProviderId::Alphavantage,
                    Arc::new(
                        AlphaVantageAdapter::with_http_client(Arc::clone(&http_client), api_key.clone())
                            .with_clock(Arc::clone(&clock))
                            .with_timeout_ms(timeout_ms),
                    ),
                );
            }
            None => debug!("alphavantage API key not configured; provider disabled"),
        }
        for provider in self.providers {
            providers.insert(provider.id(), provider);
        }

        let pacers = if self.pacing {
            providers
                .keys()
                .filter_map(|provider| {
                    Pacer::from_policy(&ProviderPolicy::default_for(*provider))
                        .map(|pacer| (*provider, pacer))
                })
                .collect()
        } else {
            HashMap::new()
        };

        debug!(
            cache_dir = %self.config.cache_dir.display(),
            providers = ?providers.keys().collect::<Vec<_>>(),
            "fetcher ready"
        );

        Ok(Fetcher {
            providers,
            pacers,
            cache,
            limiter,
            clock,
            freshness: self.config.freshness,
            timeout: self.config.timeout,
            default_period: self.config.default_period,
            default_interval: self.config.default_interval,
            fetch_locks: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}
