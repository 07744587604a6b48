use std::time::Duration;

use thiserror::Error;

use crate::ProviderId;

/// Validation errors raised while parsing domain inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or digit: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid period '{value}', expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max")]
    InvalidPeriod { value: String },
    #[error("invalid interval '{value}', expected one of 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo")]
    InvalidInterval { value: String },
    #[error("invalid indicator '{value}', expected one of sma, ema, wma, rsi, macd, bbands")]
    InvalidIndicator { value: String },
    #[error("invalid series type '{value}', expected one of close, open, high, low")]
    InvalidSeriesType { value: String },
    #[error("time period must be at least 1 bar")]
    InvalidTimePeriod,
    #[error("invalid provider '{value}', expected one of yahoo, alphavantage")]
    InvalidProvider { value: String },
    #[error("interval '{interval}' is not available for period '{period}' from {provider}")]
    UnsupportedCombination {
        provider: ProviderId,
        period: String,
        interval: String,
    },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
}

/// Configuration errors raised while loading [`crate::FetcherConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors surfaced by [`crate::Fetcher`] operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("invalid symbol: {0}")]
    InvalidSymbol(ValidationError),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("rate limit exceeded; retry in {:.0}s", retry_after.as_secs_f64())]
    RateLimitExceeded { retry_after: Duration },

    #[error("provider unavailable: {cause}")]
    ProviderUnavailable { provider: ProviderId, cause: String },

    #[error("no data returned for {symbol}")]
    NoDataReturned { symbol: String },

    #[error("cache entry '{key}' is corrupt: {reason}")]
    CacheCorrupt { key: String, reason: String },
}

impl FetchError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSymbol(_) => "fetch.invalid_symbol",
            Self::InvalidParameters(_) => "fetch.invalid_parameters",
            Self::RateLimitExceeded { .. } => "fetch.rate_limit_exceeded",
            Self::ProviderUnavailable { .. } => "fetch.provider_unavailable",
            Self::NoDataReturned { .. } => "fetch.no_data_returned",
            Self::CacheCorrupt { .. } => "fetch.cache_corrupt",
        }
    }

    /// Validation failures are never worth retrying against another provider.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidSymbol(_) | Self::InvalidParameters(_))
    }
}

impl From<ValidationError> for FetchError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::EmptySymbol
            | ValidationError::SymbolTooLong { .. }
            | ValidationError::SymbolInvalidStart { .. }
            | ValidationError::SymbolInvalidChar { .. } => Self::InvalidSymbol(error),
            other => Self::InvalidParameters(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_validation_maps_to_invalid_symbol() {
        let error = FetchError::from(ValidationError::EmptySymbol);
        assert!(matches!(error, FetchError::InvalidSymbol(_)));
        assert_eq!(error.code(), "fetch.invalid_symbol");
    }

    #[test]
    fn period_validation_maps_to_invalid_parameters() {
        let error = FetchError::from(ValidationError::InvalidPeriod {
            value: String::from("7w"),
        });
        assert!(matches!(error, FetchError::InvalidParameters(_)));
        assert!(error.is_validation());
    }

    #[test]
    fn rate_limit_message_carries_retry_hint() {
        let error = FetchError::RateLimitExceeded {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(error.to_string(), "rate limit exceeded; retry in 42s");
    }
}
