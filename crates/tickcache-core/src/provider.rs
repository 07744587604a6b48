//! Provider adapter contract.
//!
//! Every market data feed implements [`ProviderClient`]. Adapters translate the
//! feed's wire format into the canonical domain types and classify failures as
//! [`SourceError`]s; the fetcher decides what those mean for the caller.
//!
//! | Endpoint | Query | Result |
//! |----------|-------|--------|
//! | History | [`HistoryQuery`] | [`PriceSeries`] |
//! | Info | [`Symbol`] | [`CompanyInfo`] |
//! | Quote | [`Symbol`] | [`Quote`] |
//! | Indicator | [`IndicatorQuery`] | [`IndicatorSeries`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{
    CompanyInfo, Indicator, IndicatorSeries, Interval, Period, PriceSeries, ProviderId, Quote,
    SeriesType, Symbol,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    History,
    Info,
    Quote,
    Indicator,
}

impl Endpoint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Info => "info",
            Self::Quote => "quote",
            Self::Indicator => "indicator",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoints a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub history: bool,
    pub info: bool,
    pub quote: bool,
    pub indicator: bool,
}

impl CapabilitySet {
    /// Price data endpoints only; indicators are opted into separately.
    pub const fn new(history: bool, info: bool, quote: bool) -> Self {
        Self {
            history,
            info,
            quote,
            indicator: false,
        }
    }

    pub const fn with_indicator(mut self) -> Self {
        self.indicator = true;
        self
    }

    pub const fn full() -> Self {
        Self::new(true, true, true).with_indicator()
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::History => self.history,
            Endpoint::Info => self.info,
            Endpoint::Quote => self.quote,
            Endpoint::Indicator => self.indicator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    UnsupportedEndpoint,
    Unavailable,
    RateLimited,
    NoData,
    InvalidRequest,
    Internal,
}

/// Adapter-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unsupported_endpoint(provider: ProviderId, endpoint: Endpoint) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedEndpoint,
            message: format!("endpoint '{endpoint}' is not supported by {provider}"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NoData,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::UnsupportedEndpoint => "source.unsupported_endpoint",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::NoData => "source.no_data",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Validated price history query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryQuery {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
}

impl HistoryQuery {
    pub fn new(symbol: Symbol, period: Period, interval: Interval) -> Self {
        Self {
            symbol,
            period,
            interval,
        }
    }
}

/// Validated technical indicator query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicatorQuery {
    pub symbol: Symbol,
    pub indicator: Indicator,
    pub interval: Interval,
    pub time_period: u32,
    pub series_type: SeriesType,
}

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Market data feed adapter.
///
/// Implementations must be `Send + Sync`; the fetcher shares them behind `Arc`.
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    /// Fails when a call made now would be rejected before reaching the
    /// network. The fetcher checks this before spending rate budget.
    fn ready(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Whether the feed serves `interval` bars over `period`.
    fn supports(&self, period: Period, interval: Interval) -> bool;

    /// Fetches OHLCV history.
    ///
    /// # Errors
    ///
    /// `NoData` when the feed answers without rows, `RateLimited` when the
    /// feed itself throttles, `Unavailable` on transport or upstream failure.
    fn fetch_history<'a>(&'a self, query: &'a HistoryQuery) -> ProviderFuture<'a, PriceSeries>;

    fn fetch_info<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, CompanyInfo>;

    fn fetch_quote<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Quote>;

    /// Whether the feed computes indicators on `interval` bars.
    fn supports_indicator(&self, _interval: Interval) -> bool {
        false
    }

    /// Fetches a technical indicator computed by the feed.
    fn fetch_indicator<'a>(&'a self, _query: &'a IndicatorQuery) -> ProviderFuture<'a, IndicatorSeries> {
        let provider = self.id();
        Box::pin(async move {
            Err(SourceError::unsupported_endpoint(provider, Endpoint::Indicator))
        })
    }
}
