use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Interval, ProviderId, Symbol, UtcDateTime, ValidationError};

/// Technical indicator computed by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Sma,
    Ema,
    Wma,
    Rsi,
    Macd,
    Bbands,
}

impl Indicator {
    pub const ALL: [Self; 6] = [
        Self::Sma,
        Self::Ema,
        Self::Wma,
        Self::Rsi,
        Self::Macd,
        Self::Bbands,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Ema => "ema",
            Self::Wma => "wma",
            Self::Rsi => "rsi",
            Self::Macd => "macd",
            Self::Bbands => "bbands",
        }
    }

    /// Upstream function name.
    pub const fn function(self) -> &'static str {
        match self {
            Self::Sma => "SMA",
            Self::Ema => "EMA",
            Self::Wma => "WMA",
            Self::Rsi => "RSI",
            Self::Macd => "MACD",
            Self::Bbands => "BBANDS",
        }
    }
}

impl Display for Indicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Indicator {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|indicator| indicator.as_str() == normalized)
            .ok_or(ValidationError::InvalidIndicator { value: normalized })
    }
}

/// Price column an indicator is computed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesType {
    #[default]
    Close,
    Open,
    High,
    Low,
}

impl SeriesType {
    pub const ALL: [Self; 4] = [Self::Close, Self::Open, Self::High, Self::Low];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl Display for SeriesType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|series_type| series_type.as_str() == normalized)
            .ok_or(ValidationError::InvalidSeriesType { value: normalized })
    }
}

/// Indicator outputs at one timestamp, keyed by the provider's output name
/// (`SMA`, `MACD_Signal`, `Real Upper Band`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub date: UtcDateTime,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub symbol: Symbol,
    pub indicator: Indicator,
    pub interval: Interval,
    pub time_period: u32,
    pub series_type: SeriesType,
    pub provider: ProviderId,
    pub points: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Sorts points ascending, keeps the last point seen for a duplicated
    /// date, drops non-finite values and then points left without any.
    pub fn normalize(&mut self) {
        let mut points = std::mem::take(&mut self.points);
        for point in &mut points {
            point.values.retain(|_, value| value.is_finite());
        }
        points.retain(|point| !point.values.is_empty());
        points.sort_by_key(|point| point.date);

        let mut deduped: Vec<IndicatorPoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        self.points = deduped;
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Most recent value of output `name`.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.points
            .iter()
            .rev()
            .find_map(|point| point.values.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> UtcDateTime {
        UtcDateTime::parse(value).expect("timestamp")
    }

    fn point(date: &str, values: &[(&str, f64)]) -> IndicatorPoint {
        IndicatorPoint {
            date: ts(date),
            values: values
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
        }
    }

    #[test]
    fn parses_indicator_case_insensitively() {
        assert_eq!(Indicator::from_str("SMA"), Ok(Indicator::Sma));
        assert_eq!(Indicator::from_str(" bbands "), Ok(Indicator::Bbands));
        assert_eq!(Indicator::Macd.function(), "MACD");

        let err = Indicator::from_str("vwap").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidIndicator { .. }));
    }

    #[test]
    fn series_type_defaults_to_close() {
        assert_eq!(SeriesType::default(), SeriesType::Close);
        assert_eq!(SeriesType::from_str("High"), Ok(SeriesType::High));
        assert!(SeriesType::from_str("median").is_err());
    }

    #[test]
    fn normalize_orders_dedupes_and_drops_empty_points() {
        let mut series = IndicatorSeries {
            symbol: Symbol::parse("IBM").expect("valid symbol"),
            indicator: Indicator::Macd,
            interval: Interval::OneDay,
            time_period: 10,
            series_type: SeriesType::Close,
            provider: ProviderId::Alphavantage,
            points: vec![
                point("2024-03-01T00:00:00Z", &[("MACD", 1.5), ("MACD_Signal", 1.1)]),
                point("2024-02-28T00:00:00Z", &[("MACD", 0.9)]),
                point("2024-02-29T00:00:00Z", &[("MACD", f64::NAN)]),
                point("2024-03-01T00:00:00Z", &[("MACD", 1.6)]),
            ],
        };

        series.normalize();

        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].date, ts("2024-02-28T00:00:00Z"));
        assert_eq!(series.latest("MACD"), Some(1.6));
        assert_eq!(series.latest("MACD_Signal"), None);
    }
}
