use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use super::Upstream;
use crate::clock::{system_clock, Clock};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient, DEFAULT_TIMEOUT_MS};
use crate::provider::{
    CapabilitySet, HistoryQuery, IndicatorQuery, ProviderClient, ProviderFuture, SourceError,
};
use crate::{
    CompanyInfo, IndicatorPoint, IndicatorSeries, Interval, Period, PriceRow, PriceSeries,
    ProviderId, Quote, Symbol, UtcDateTime,
};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage adapter. Every request carries the account's API key.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    upstream: Upstream,
    api_key: String,
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
}

impl AlphaVantageAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), api_key)
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Alphavantage, http_client),
            api_key: api_key.into(),
            clock: system_clock(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn circuit_state(&self) -> crate::circuit_breaker::CircuitState {
        self.upstream.breaker().state()
    }

    /// Runs one `function` call and returns the decoded JSON object, with
    /// in-band error notes already classified.
    async fn call(
        &self,
        function: &str,
        symbol: &Symbol,
        extra: &[(&str, &str)],
    ) -> Result<Map<String, Value>, SourceError> {
        let mut request = HttpRequest::get(BASE_URL)
            .with_query("function", function)
            .with_query("symbol", symbol.as_str());
        for (name, value) in extra {
            request = request.with_query(name, value);
        }
        let request = request
            .with_query("apikey", &self.api_key)
            .with_timeout_ms(self.timeout_ms);

        let response = self.upstream.send(request).await?;
        let body = self.upstream.success_body(response)?;

        let document: Value = serde_json::from_str(&body).map_err(|error| {
            SourceError::internal(format!("failed to parse alphavantage {function}: {error}"))
        })?;
        let Value::Object(object) = document else {
            return Err(SourceError::no_data(format!(
                "alphavantage {function} returned a non-object body for {symbol}"
            )));
        };

        classify_notes(&object)?;
        Ok(object)
    }
}

/// Alpha Vantage answers 200 for almost everything and reports problems in
/// well-known top-level fields.
fn classify_notes(object: &Map<String, Value>) -> Result<(), SourceError> {
    if let Some(message) = object.get("Error Message").and_then(Value::as_str) {
        return Err(SourceError::invalid_request(format!(
            "alphavantage rejected the request: {message}"
        )));
    }

    if let Some(note) = object.get("Note").and_then(Value::as_str) {
        return Err(SourceError::rate_limited(format!("alphavantage throttled: {note}")));
    }

    if let Some(information) = object.get("Information").and_then(Value::as_str) {
        let lowered = information.to_ascii_lowercase();
        if ["rate limit", "frequency", "per day", "requests per"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            return Err(SourceError::rate_limited(format!(
                "alphavantage throttled: {information}"
            )));
        }
        return Err(SourceError::invalid_request(format!(
            "alphavantage refused the request: {information}"
        )));
    }

    Ok(())
}

impl ProviderClient for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn ready(&self) -> Result<(), SourceError> {
        self.upstream.ready()
    }

    fn supports(&self, period: Period, interval: Interval) -> bool {
        match intraday_code(interval) {
            Some(_) => matches!(period, Period::OneDay | Period::FiveDays | Period::OneMonth),
            None => matches!(
                interval,
                Interval::OneDay | Interval::OneWeek | Interval::OneMonth
            ),
        }
    }

    fn fetch_history<'a>(&'a self, query: &'a HistoryQuery) -> ProviderFuture<'a, PriceSeries> {
        Box::pin(async move {
            if !self.supports(query.period, query.interval) {
                return Err(SourceError::invalid_request(format!(
                    "alphavantage does not serve {} bars over {}",
                    query.interval, query.period
                )));
            }

            let outputsize = if query.period.is_longer_than(Period::ThreeMonths) {
                "full"
            } else {
                "compact"
            };

            let object = match (intraday_code(query.interval), query.interval) {
                (Some(code), _) => {
                    self.call(
                        "TIME_SERIES_INTRADAY",
                        &query.symbol,
                        &[("interval", code), ("outputsize", "full")],
                    )
                    .await?
                }
                (None, Interval::OneWeek) => {
                    self.call("TIME_SERIES_WEEKLY", &query.symbol, &[]).await?
                }
                (None, Interval::OneMonth) => {
                    self.call("TIME_SERIES_MONTHLY", &query.symbol, &[]).await?
                }
                (None, _) => {
                    self.call(
                        "TIME_SERIES_DAILY",
                        &query.symbol,
                        &[("outputsize", outputsize)],
                    )
                    .await?
                }
            };

            let rows = parse_time_series(&object)?;
            let mut series = PriceSeries::normalized(
                query.symbol.clone(),
                query.period,
                query.interval,
                ProviderId::Alphavantage,
                rows,
            );
            series.trim_before(query.period.window_start(self.clock.now()));

            if series.is_empty() {
                return Err(SourceError::no_data(format!(
                    "alphavantage returned no rows for {} {} {}",
                    query.symbol, query.period, query.interval
                )));
            }
            Ok(series)
        })
    }

    fn fetch_info<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, CompanyInfo> {
        Box::pin(async move {
            let overview = self.call("OVERVIEW", symbol, &[]).await?;

            let text = |field: &str| -> Option<String> {
                overview
                    .get(field)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| is_present(value))
                    .map(str::to_owned)
            };
            let number =
                |field: &str| -> Option<f64> { text(field).and_then(|value| parse_number(&value)) };

            let info = CompanyInfo {
                symbol: symbol.clone(),
                name: text("Name"),
                description: text("Description"),
                sector: text("Sector"),
                industry: text("Industry"),
                exchange: text("Exchange"),
                currency: text("Currency"),
                country: text("Country"),
                market_cap: number("MarketCapitalization"),
                pe_ratio: number("PERatio"),
                forward_pe: number("ForwardPE"),
                dividend_yield: number("DividendYield"),
                beta: number("Beta"),
                fifty_two_week_high: number("52WeekHigh"),
                fifty_two_week_low: number("52WeekLow"),
                current_price: None,
            };

            if info.is_blank() {
                return Err(SourceError::no_data(format!(
                    "alphavantage has no overview for {symbol}"
                )));
            }
            Ok(info)
        })
    }

    fn fetch_quote<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Quote> {
        Box::pin(async move {
            let object = self.call("GLOBAL_QUOTE", symbol, &[]).await?;

            let global: GlobalQuote = object
                .get("Global Quote")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|error| {
                    SourceError::internal(format!("failed to parse alphavantage quote: {error}"))
                })?
                .unwrap_or_default();

            let price = global
                .price
                .as_deref()
                .and_then(parse_number)
                .ok_or_else(|| SourceError::no_data(format!("alphavantage has no quote for {symbol}")))?;

            let mut quote = Quote::new(symbol.clone(), price, self.clock.now())
                .map_err(|error| SourceError::internal(error.to_string()))?;
            quote.open = global.open.as_deref().and_then(parse_number);
            quote.high = global.high.as_deref().and_then(parse_number);
            quote.low = global.low.as_deref().and_then(parse_number);
            quote.previous_close = global.previous_close.as_deref().and_then(parse_number);
            quote.change = global.change.as_deref().and_then(parse_number);
            quote.change_percent = global
                .change_percent
                .as_deref()
                .map(|value| value.trim_end_matches('%'))
                .and_then(parse_number);
            quote.volume = global
                .volume
                .as_deref()
                .and_then(|value| value.trim().parse::<u64>().ok());
            quote.latest_trading_day = global.latest_trading_day.filter(|day| is_present(day));

            Ok(quote.with_derived_change())
        })
    }

    fn supports_indicator(&self, interval: Interval) -> bool {
        indicator_interval(interval).is_some()
    }

    fn fetch_indicator<'a>(&'a self, query: &'a IndicatorQuery) -> ProviderFuture<'a, IndicatorSeries> {
        Box::pin(async move {
            let Some(interval) = indicator_interval(query.interval) else {
                return Err(SourceError::invalid_request(format!(
                    "alphavantage does not compute indicators on {} bars",
                    query.interval
                )));
            };
            let time_period = query.time_period.to_string();

            let object = self
                .call(
                    query.indicator.function(),
                    &query.symbol,
                    &[
                        ("interval", interval),
                        ("time_period", time_period.as_str()),
                        ("series_type", query.series_type.as_str()),
                    ],
                )
                .await?;

            let mut series = IndicatorSeries {
                symbol: query.symbol.clone(),
                indicator: query.indicator,
                interval: query.interval,
                time_period: query.time_period,
                series_type: query.series_type,
                provider: ProviderId::Alphavantage,
                points: parse_technical_analysis(&object)?,
            };
            series.normalize();

            if series.is_empty() {
                return Err(SourceError::no_data(format!(
                    "alphavantage returned no {} values for {}",
                    query.indicator, query.symbol
                )));
            }
            Ok(series)
        })
    }
}

const fn intraday_code(interval: Interval) -> Option<&'static str> {
    match interval {
        Interval::OneMinute => Some("1min"),
        Interval::FiveMinutes => Some("5min"),
        Interval::FifteenMinutes => Some("15min"),
        Interval::ThirtyMinutes => Some("30min"),
        Interval::SixtyMinutes | Interval::OneHour => Some("60min"),
        _ => None,
    }
}

const fn indicator_interval(interval: Interval) -> Option<&'static str> {
    match interval {
        Interval::OneDay => Some("daily"),
        Interval::OneWeek => Some("weekly"),
        Interval::OneMonth => Some("monthly"),
        other => intraday_code(other),
    }
}

#[derive(Debug, Deserialize)]
struct SeriesBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume", default)]
    volume: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "02. open", default)]
    open: Option<String>,
    #[serde(rename = "03. high", default)]
    high: Option<String>,
    #[serde(rename = "04. low", default)]
    low: Option<String>,
    #[serde(rename = "05. price", default)]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day", default)]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close", default)]
    previous_close: Option<String>,
    #[serde(rename = "09. change", default)]
    change: Option<String>,
    #[serde(rename = "10. change percent", default)]
    change_percent: Option<String>,
}

/// Rows of the `"Time Series (...)"` / `"Weekly Time Series"` object. Bars
/// with unparseable numbers are skipped.
fn parse_time_series(object: &Map<String, Value>) -> Result<Vec<PriceRow>, SourceError> {
    let Some(Value::Object(series)) = object
        .iter()
        .find(|(key, _)| key.contains("Time Series"))
        .map(|(_, value)| value)
    else {
        return Err(SourceError::no_data("alphavantage response has no time series"));
    };

    let mut rows = Vec::with_capacity(series.len());
    for (stamp, bar) in series {
        let bar: SeriesBar = serde_json::from_value(bar.clone()).map_err(|error| {
            SourceError::internal(format!("malformed alphavantage bar at {stamp}: {error}"))
        })?;
        let Some(date) = parse_bar_timestamp(stamp) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            parse_number(&bar.open),
            parse_number(&bar.high),
            parse_number(&bar.low),
            parse_number(&bar.close),
        ) else {
            continue;
        };
        let volume = bar
            .volume
            .as_deref()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(0);
        if let Ok(row) = PriceRow::new(date, open, high, low, close, volume) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Points of the `"Technical Analysis: ..."` object. Non-numeric outputs are
/// skipped.
fn parse_technical_analysis(object: &Map<String, Value>) -> Result<Vec<IndicatorPoint>, SourceError> {
    let Some(Value::Object(analysis)) = object
        .iter()
        .find(|(key, _)| key.contains("Technical Analysis"))
        .map(|(_, value)| value)
    else {
        return Err(SourceError::no_data("alphavantage response has no technical analysis"));
    };

    let mut points = Vec::with_capacity(analysis.len());
    for (stamp, outputs) in analysis {
        let (Some(date), Value::Object(outputs)) = (parse_bar_timestamp(stamp), outputs) else {
            continue;
        };
        let values: BTreeMap<String, f64> = outputs
            .iter()
            .filter_map(|(name, value)| {
                value
                    .as_str()
                    .and_then(parse_number)
                    .map(|number| (name.clone(), number))
            })
            .collect();
        points.push(IndicatorPoint { date, values });
    }
    Ok(points)
}

/// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD HH:MM:SS`, read as UTC.
fn parse_bar_timestamp(value: &str) -> Option<UtcDateTime> {
    let value = value.trim();
    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Some(UtcDateTime::start_of_day(date));
    }
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(value, format_description!("[year]-[month]-[day] [hour]:[minute]"))
    })
    .ok()
    .and_then(|stamp| UtcDateTime::from_offset_datetime(stamp.assume_utc()).ok())
}

fn is_present(value: &str) -> bool {
    !value.is_empty() && value != "None" && value != "-"
}

fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if !is_present(value) {
        return None;
    }
    value.parse::<f64>().ok().filter(|number| number.is_finite())
}
