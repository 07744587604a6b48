//! # Domain Models
//!
//! Canonical types shared by providers, the cache and the fetcher.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker symbol |
//! | [`Period`] | History lookback (1d .. max) |
//! | [`Interval`] | Bar spacing (1m .. 3mo) |
//! | [`PriceRow`] / [`PriceSeries`] | Normalized OHLCV history |
//! | [`CompanyInfo`] | Company profile record |
//! | [`Quote`] | Latest price snapshot |
//! | [`IndicatorSeries`] | Provider-computed technical indicator |
//! | [`UtcDateTime`] | UTC timestamp |

mod indicator;
mod interval;
mod models;
mod period;
mod symbol;
mod timestamp;

pub use indicator::{Indicator, IndicatorPoint, IndicatorSeries, SeriesType};
pub use interval::Interval;
pub use models::{CompanyInfo, PriceRow, PriceSeries, QualityIssue, Quote};
pub use period::Period;
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
