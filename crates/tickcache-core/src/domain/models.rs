use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Interval, Period, ProviderId, Symbol, UtcDateTime, ValidationError};

/// Bar-to-bar close change above which a move is reported as suspicious.
const EXTREME_MOVE_RATIO: f64 = 0.5;

/// One OHLCV row of a price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceRow {
    pub fn new(
        date: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        validate_finite("open", open)?;
        validate_finite("high", high)?;
        validate_finite("low", low)?;
        validate_finite("close", close)?;

        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    fn is_finite(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// Price history for one symbol, rows strictly ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
    pub provider: ProviderId,
    pub rows: Vec<PriceRow>,
}

impl PriceSeries {
    /// Builds a series, sorting rows ascending, keeping the last row seen for a
    /// duplicated date and dropping rows with non-finite prices.
    pub fn normalized(
        symbol: Symbol,
        period: Period,
        interval: Interval,
        provider: ProviderId,
        rows: Vec<PriceRow>,
    ) -> Self {
        let mut rows = rows
            .into_iter()
            .filter(PriceRow::is_finite)
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| row.date);

        let mut deduped: Vec<PriceRow> = Vec::with_capacity(rows.len());
        for row in rows {
            match deduped.last_mut() {
                Some(last) if last.date == row.date => *last = row,
                _ => deduped.push(row),
            }
        }

        Self {
            symbol,
            period,
            interval,
            provider,
            rows: deduped,
        }
    }

    /// Drops rows older than `start`.
    pub fn trim_before(&mut self, start: Option<UtcDateTime>) {
        if let Some(start) = start {
            self.rows.retain(|row| row.date >= start);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.rows.last().map(|row| row.close)
    }

    /// Data-quality findings worth a warning; never fatal.
    pub fn quality_issues(&self) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        let non_positive = self
            .rows
            .iter()
            .filter(|row| row.open <= 0.0 || row.high <= 0.0 || row.low <= 0.0 || row.close <= 0.0)
            .count();
        if non_positive > 0 {
            issues.push(QualityIssue::NonPositivePrices { rows: non_positive });
        }

        let extreme_moves = self
            .rows
            .windows(2)
            .filter(|pair| {
                let previous = pair[0].close;
                previous > 0.0 && ((pair[1].close - previous) / previous).abs() > EXTREME_MOVE_RATIO
            })
            .count();
        if extreme_moves > 0 {
            issues.push(QualityIssue::ExtremeMoves {
                count: extreme_moves,
            });
        }

        issues
    }
}

/// Suspicious but tolerated properties of a fetched series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    NonPositivePrices { rows: usize },
    ExtremeMoves { count: usize },
}

impl Display for QualityIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositivePrices { rows } => {
                write!(f, "{rows} row(s) with zero or negative prices")
            }
            Self::ExtremeMoves { count } => {
                write!(f, "{count} bar-to-bar close move(s) above 50%")
            }
        }
    }
}

/// Company profile and headline valuation figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub symbol: Symbol,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub country: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub current_price: Option<f64>,
}

impl CompanyInfo {
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            name: None,
            description: None,
            sector: None,
            industry: None,
            exchange: None,
            currency: None,
            country: None,
            market_cap: None,
            pe_ratio: None,
            forward_pe: None,
            dividend_yield: None,
            beta: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            current_price: None,
        }
    }

    /// True when nothing beyond the symbol was filled in.
    pub fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.sector.is_none()
            && self.industry.is_none()
            && self.exchange.is_none()
            && self.market_cap.is_none()
            && self.current_price.is_none()
    }
}

/// Latest traded price with session context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub latest_trading_day: Option<String>,
    pub as_of: UtcDateTime,
}

impl Quote {
    pub fn new(symbol: Symbol, price: f64, as_of: UtcDateTime) -> Result<Self, ValidationError> {
        validate_finite("price", price)?;
        Ok(Self {
            symbol,
            price,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            change: None,
            change_percent: None,
            volume: None,
            latest_trading_day: None,
            as_of,
        })
    }

    /// Fills `change` and `change_percent` from `previous_close` when the
    /// provider left them out.
    pub fn with_derived_change(mut self) -> Self {
        if let Some(previous) = self.previous_close.filter(|value| *value > 0.0) {
            let change = self.price - previous;
            self.change.get_or_insert(change);
            self.change_percent.get_or_insert(change / previous * 100.0);
        }
        self
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> UtcDateTime {
        UtcDateTime::parse(value).expect("timestamp")
    }

    fn row(date: &str, close: f64) -> PriceRow {
        PriceRow {
            date: ts(date),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
        }
    }

    fn series(rows: Vec<PriceRow>) -> PriceSeries {
        PriceSeries::normalized(
            Symbol::parse("AAPL").expect("symbol"),
            Period::OneMonth,
            Interval::OneDay,
            ProviderId::Yahoo,
            rows,
        )
    }

    #[test]
    fn normalization_sorts_and_dedupes_by_date() {
        let normalized = series(vec![
            row("2024-01-03T00:00:00Z", 3.0),
            row("2024-01-01T00:00:00Z", 1.0),
            row("2024-01-02T00:00:00Z", 2.0),
            row("2024-01-02T00:00:00Z", 2.5),
        ]);

        let closes = normalized.rows.iter().map(|row| row.close).collect::<Vec<_>>();
        assert_eq!(closes, vec![1.0, 2.5, 3.0]);
    }

    #[test]
    fn normalization_drops_non_finite_rows() {
        let normalized = series(vec![
            row("2024-01-01T00:00:00Z", f64::NAN),
            row("2024-01-02T00:00:00Z", 2.0),
        ]);
        assert_eq!(normalized.len(), 1);

        let all_nan = series(vec![row("2024-01-01T00:00:00Z", f64::NAN)]);
        assert!(all_nan.is_empty());
    }

    #[test]
    fn reports_extreme_moves_and_non_positive_prices() {
        let normalized = series(vec![
            row("2024-01-01T00:00:00Z", 10.0),
            row("2024-01-02T00:00:00Z", 16.0),
            row("2024-01-03T00:00:00Z", 0.0),
        ]);

        let issues = normalized.quality_issues();
        assert!(issues.contains(&QualityIssue::NonPositivePrices { rows: 1 }));
        assert!(issues.contains(&QualityIssue::ExtremeMoves { count: 2 }));
    }

    #[test]
    fn quote_derives_change_from_previous_close() {
        let mut quote = Quote::new(
            Symbol::parse("MSFT").expect("symbol"),
            110.0,
            ts("2024-01-01T00:00:00Z"),
        )
        .expect("quote");
        quote.previous_close = Some(100.0);

        let quote = quote.with_derived_change();
        assert_eq!(quote.change, Some(10.0));
        assert_eq!(quote.change_percent, Some(10.0));
    }

    #[test]
    fn rejects_non_finite_quote_price() {
        let err = Quote::new(
            Symbol::parse("MSFT").expect("symbol"),
            f64::INFINITY,
            ts("2024-01-01T00:00:00Z"),
        )
        .expect_err("must fail");
        assert_eq!(err, ValidationError::NonFiniteValue { field: "price" });
    }
}
