use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use super::Upstream;
use crate::clock::{system_clock, Clock};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::provider::{CapabilitySet, HistoryQuery, ProviderClient, ProviderFuture, SourceError};
use crate::{
    CompanyInfo, Interval, Period, PriceRow, PriceSeries, ProviderId, Quote, Symbol, UtcDateTime,
};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";
const SUMMARY_MODULES: &str = "assetProfile,price,summaryDetail,defaultKeyStatistics";
const REFERER: &str = "https://finance.yahoo.com/";
const CRUMB_TTL: Duration = Duration::from_secs(60 * 60);

/// Session crumb required by the quoteSummary endpoint.
///
/// The cookie it pairs with lives in the transport's cookie jar; only the
/// crumb string and its age are tracked here.
#[derive(Debug, Default)]
struct CrumbCache {
    current: Mutex<Option<(String, Instant)>>,
}

impl CrumbCache {
    fn get(&self) -> Option<String> {
        let current = self.current.lock().expect("crumb lock is not poisoned");
        current
            .as_ref()
            .filter(|(_, fetched_at)| fetched_at.elapsed() < CRUMB_TTL)
            .map(|(crumb, _)| crumb.clone())
    }

    fn set(&self, crumb: String) {
        *self.current.lock().expect("crumb lock is not poisoned") = Some((crumb, Instant::now()));
    }

    fn invalidate(&self) {
        *self.current.lock().expect("crumb lock is not poisoned") = None;
    }
}

/// Yahoo Finance adapter. No API key; the default provider.
#[derive(Clone)]
pub struct YahooAdapter {
    upstream: Upstream,
    crumbs: Arc<CrumbCache>,
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl YahooAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Yahoo, http_client),
            crumbs: Arc::new(CrumbCache::default()),
            clock: system_clock(),
            timeout_ms: crate::http_client::DEFAULT_TIMEOUT_MS,
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

    fn request(&self, url: impl Into<String>) -> HttpRequest {
        HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.timeout_ms)
    }

    async fn chart(
        &self,
        symbol: &Symbol,
        range: &str,
        interval: &str,
    ) -> Result<ChartResult, SourceError> {
        let request = self
            .request(format!("{CHART_URL}/{}", urlencoding::encode(symbol.as_str())))
            .with_query("range", range)
            .with_query("interval", interval)
            .with_query("includePrePost", "false");

        let response = self.upstream.send(request).await?;
        let status = response.status;
        let body = response.body;

        let parsed: ChartResponse = serde_json::from_str(&body).map_err(|error| {
            if (200..300).contains(&status) {
                SourceError::internal(format!("failed to parse yahoo chart: {error}"))
            } else {
                SourceError::unavailable(format!("yahoo chart returned status {status}"))
            }
        })?;

        if let Some(error) = parsed.chart.error {
            return Err(SourceError::no_data(format!(
                "yahoo chart error for {symbol}: {}",
                error.describe()
            )));
        }

        parsed
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| SourceError::no_data(format!("yahoo chart has no result for {symbol}")))
    }

    async fn crumb(&self) -> Result<String, SourceError> {
        if let Some(crumb) = self.crumbs.get() {
            return Ok(crumb);
        }

        // fc.yahoo.com answers 404 but sets the session cookie.
        let _ = self.upstream.send(self.request(COOKIE_URL)).await?;

        let response = self.upstream.send(self.request(CRUMB_URL)).await?;
        let body = self.upstream.success_body(response)?;
        let crumb = body.trim();
        let looks_valid = !crumb.is_empty()
            && crumb.len() < 100
            && !crumb.contains(char::is_whitespace)
            && !crumb.contains('<');
        if !looks_valid {
            return Err(SourceError::unavailable("yahoo returned an unusable crumb"));
        }

        debug!("refreshed yahoo crumb");
        self.crumbs.set(crumb.to_owned());
        Ok(crumb.to_owned())
    }

    async fn quote_summary(&self, symbol: &Symbol) -> Result<String, SourceError> {
        for attempt in 0..2 {
            let crumb = self.crumb().await?;
            let request = self
                .request(format!(
                    "{QUOTE_SUMMARY_URL}/{}",
                    urlencoding::encode(symbol.as_str())
                ))
                .with_query("modules", SUMMARY_MODULES)
                .with_query("crumb", &crumb);

            let response = self.upstream.send(request).await?;
            if matches!(response.status, 401 | 403) && attempt == 0 {
                warn!(symbol = %symbol, status = response.status, "yahoo rejected crumb; refreshing");
                self.crumbs.invalidate();
                continue;
            }
            return self.upstream.success_body(response);
        }

        Err(SourceError::unavailable(
            "yahoo rejected a freshly issued crumb",
        ))
    }
}

impl ProviderClient for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, true)
    }

    fn ready(&self) -> Result<(), SourceError> {
        self.upstream.ready()
    }

    fn supports(&self, period: Period, interval: Interval) -> bool {
        match interval {
            Interval::OneMinute => matches!(period, Period::OneDay | Period::FiveDays),
            Interval::TwoMinutes
            | Interval::FiveMinutes
            | Interval::FifteenMinutes
            | Interval::ThirtyMinutes
            | Interval::NinetyMinutes => {
                matches!(period, Period::OneDay | Period::FiveDays | Period::OneMonth)
            }
            Interval::SixtyMinutes | Interval::OneHour => {
                !matches!(period, Period::FiveYears | Period::TenYears | Period::Max)
            }
            Interval::OneDay
            | Interval::FiveDays
            | Interval::OneWeek
            | Interval::OneMonth
            | Interval::ThreeMonths => true,
        }
    }

    fn fetch_history<'a>(&'a self, query: &'a HistoryQuery) -> ProviderFuture<'a, PriceSeries> {
        Box::pin(async move {
            let result = self
                .chart(&query.symbol, query.period.as_str(), query.interval.as_str())
                .await?;

            let series = PriceSeries::normalized(
                query.symbol.clone(),
                query.period,
                query.interval,
                ProviderId::Yahoo,
                result.rows(),
            );
            if series.is_empty() {
                return Err(SourceError::no_data(format!(
                    "yahoo returned no rows for {} {} {}",
                    query.symbol, query.period, query.interval
                )));
            }
            Ok(series)
        })
    }

    fn fetch_info<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, CompanyInfo> {
        Box::pin(async move {
            let body = self.quote_summary(symbol).await?;
            let parsed: QuoteSummaryResponse = serde_json::from_str(&body).map_err(|error| {
                SourceError::internal(format!("failed to parse yahoo quoteSummary: {error}"))
            })?;

            if let Some(error) = parsed.quote_summary.error {
                return Err(SourceError::no_data(format!(
                    "yahoo quoteSummary error for {symbol}: {}",
                    error.describe()
                )));
            }

            let info = parsed
                .quote_summary
                .result
                .and_then(|results| results.into_iter().next())
                .map(|result| result.into_company_info(symbol.clone()))
                .filter(|info| !info.is_blank())
                .ok_or_else(|| {
                    SourceError::no_data(format!("yahoo has no company profile for {symbol}"))
                })?;
            Ok(info)
        })
    }

    fn fetch_quote<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Quote> {
        Box::pin(async move {
            let result = self.chart(symbol, "1d", "1m").await?;
            let rows = result.rows();
            let meta = result.meta.unwrap_or_default();

            let price = meta
                .regular_market_price
                .filter(|price| price.is_finite())
                .or_else(|| rows.last().map(|row| row.close))
                .ok_or_else(|| SourceError::no_data(format!("yahoo has no price for {symbol}")))?;

            let as_of = meta
                .regular_market_time
                .and_then(|seconds| UtcDateTime::from_unix_timestamp(seconds).ok())
                .unwrap_or_else(|| self.clock.now());

            let mut quote = Quote::new(symbol.clone(), price, as_of)
                .map_err(|error| SourceError::internal(error.to_string()))?;
            quote.previous_close = meta.chart_previous_close.or(meta.previous_close);
            quote.open = rows.first().map(|row| row.open);
            quote.high = rows.iter().map(|row| row.high).reduce(f64::max);
            quote.low = rows.iter().map(|row| row.low).reduce(f64::min);
            quote.volume = meta
                .regular_market_volume
                .or_else(|| (!rows.is_empty()).then(|| rows.iter().map(|row| row.volume).sum()));
            quote.latest_trading_day = Some(as_of.date().to_string());

            Ok(quote.with_derived_change())
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl YahooApiError {
    fn describe(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(description)) => format!("{code}: {description}"),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => String::from("unspecified error"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

impl ChartResult {
    /// Rows with a complete OHLC tuple; missing volume counts as zero.
    fn rows(&self) -> Vec<PriceRow> {
        let (Some(timestamps), Some(quote)) = (
            self.timestamp.as_ref(),
            self.indicators
                .as_ref()
                .and_then(|indicators| indicators.quote.first()),
        ) else {
            return Vec::new();
        };

        timestamps
            .iter()
            .enumerate()
            .filter_map(|(index, seconds)| {
                let date = UtcDateTime::from_unix_timestamp(*seconds).ok()?;
                let open = quote.open.get(index).copied().flatten()?;
                let high = quote.high.get(index).copied().flatten()?;
                let low = quote.low.get(index).copied().flatten()?;
                let close = quote.close.get(index).copied().flatten()?;
                let volume = quote
                    .volume
                    .get(index)
                    .copied()
                    .flatten()
                    .map_or(0, |volume| volume.max(0) as u64);
                PriceRow::new(date, open, high, low, close, volume).ok()
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
    #[serde(default)]
    regular_market_volume: Option<u64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_detail: Option<SummaryDetail>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatistics>,
}

impl QuoteSummaryResult {
    fn into_company_info(self, symbol: Symbol) -> CompanyInfo {
        let profile = self.asset_profile.unwrap_or_default();
        let price = self.price.unwrap_or_default();
        let detail = self.summary_detail.unwrap_or_default();
        let stats = self.default_key_statistics.unwrap_or_default();

        CompanyInfo {
            symbol,
            name: price.long_name.or(price.short_name),
            description: profile.long_business_summary,
            sector: profile.sector,
            industry: profile.industry,
            exchange: price.exchange_name,
            currency: price.currency.or(detail.currency),
            country: profile.country,
            market_cap: raw(price.market_cap).or_else(|| raw(detail.market_cap)),
            pe_ratio: raw(detail.trailing_pe),
            forward_pe: raw(detail.forward_pe).or_else(|| raw(stats.forward_pe)),
            dividend_yield: raw(detail.dividend_yield),
            beta: raw(detail.beta).or_else(|| raw(stats.beta)),
            fifty_two_week_high: raw(detail.fifty_two_week_high),
            fifty_two_week_low: raw(detail.fifty_two_week_low),
            current_price: raw(price.regular_market_price),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    long_business_summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    exchange_name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    market_cap: Option<RawValue>,
    #[serde(default)]
    regular_market_price: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    market_cap: Option<RawValue>,
    #[serde(rename = "trailingPE", default)]
    trailing_pe: Option<RawValue>,
    #[serde(rename = "forwardPE", default)]
    forward_pe: Option<RawValue>,
    #[serde(default)]
    dividend_yield: Option<RawValue>,
    #[serde(default)]
    beta: Option<RawValue>,
    #[serde(default)]
    fifty_two_week_high: Option<RawValue>,
    #[serde(default)]
    fifty_two_week_low: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    #[serde(rename = "forwardPE", default)]
    forward_pe: Option<RawValue>,
    #[serde(default)]
    beta: Option<RawValue>,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`, or `{}` when absent.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

fn raw(value: Option<RawValue>) -> Option<f64> {
    value
        .and_then(|value| value.raw)
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::ScriptedHttpClient;
    use crate::circuit_breaker::CircuitState;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::provider::SourceErrorKind;

    const CHART_BODY: &str = r#"{"chart":{"result":[{
        "meta":{"currency":"USD","symbol":"AAPL","regularMarketPrice":187.5,
                "regularMarketTime":1704304800,"chartPreviousClose":185.0},
        "timestamp":[1704205800,1704292200,1704378600],
        "indicators":{"quote":[{
            "open":[187.15,184.22,null],
            "high":[188.44,185.88,183.09],
            "low":[183.89,183.43,180.88],
            "close":[185.64,184.25,181.91],
            "volume":[82488700,58414500,71983600]}]}}],"error":null}}"#;

    const SUMMARY_BODY: &str = r#"{"quoteSummary":{"result":[{
        "assetProfile":{"sector":"Technology","industry":"Consumer Electronics",
                        "country":"United States","longBusinessSummary":"Designs devices."},
        "price":{"longName":"Apple Inc.","exchangeName":"NasdaqGS","currency":"USD",
                 "marketCap":{"raw":2.9e12,"fmt":"2.9T"},"regularMarketPrice":{"raw":187.5}},
        "summaryDetail":{"trailingPE":{"raw":29.1},"forwardPE":{},"dividendYield":{"raw":0.005},
                         "beta":{"raw":1.29},"fiftyTwoWeekHigh":{"raw":199.62},"fiftyTwoWeekLow":{"raw":143.9}},
        "defaultKeyStatistics":{"forwardPE":{"raw":27.4}}}],"error":null}}"#;

    fn adapter(client: &Arc<ScriptedHttpClient>) -> YahooAdapter {
        YahooAdapter::with_http_client(client.clone())
    }

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").expect("valid symbol")
    }

    #[tokio::test]
    async fn history_parses_chart_and_drops_incomplete_rows() {
        let client = Arc::new(ScriptedHttpClient::new().on("/chart/AAPL", HttpResponse::ok_json(CHART_BODY)));
        let query = HistoryQuery::new(aapl(), Period::OneMonth, Interval::OneDay);

        let series = adapter(&client)
            .fetch_history(&query)
            .await
            .expect("history should parse");

        assert_eq!(series.provider, ProviderId::Yahoo);
        assert_eq!(series.len(), 2);
        assert!(series.rows[0].date < series.rows[1].date);
        assert_eq!(series.rows[1].close, 184.25);

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.contains("range=1mo"));
        assert!(requests[0].url.contains("interval=1d"));
    }

    #[tokio::test]
    async fn unknown_symbol_chart_error_is_no_data() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let client = Arc::new(ScriptedHttpClient::new().on("/chart/", HttpResponse::with_status(404, body)));
        let query = HistoryQuery::new(
            Symbol::parse("ZZZZ").expect("valid symbol"),
            Period::OneMonth,
            Interval::OneDay,
        );

        let error = adapter(&client)
            .fetch_history(&query)
            .await
            .expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::NoData);
        assert!(error.message().contains("delisted"));
    }

    #[tokio::test]
    async fn quote_uses_market_price_and_derives_change() {
        let client = Arc::new(ScriptedHttpClient::new().on("/chart/AAPL", HttpResponse::ok_json(CHART_BODY)));

        let quote = adapter(&client).fetch_quote(&aapl()).await.expect("quote");

        assert_eq!(quote.price, 187.5);
        assert_eq!(quote.previous_close, Some(185.0));
        assert_eq!(quote.change, Some(2.5));
        assert_eq!(quote.high, Some(188.44));
        assert!(client.recorded_requests()[0].url.contains("interval=1m"));
    }

    #[tokio::test]
    async fn info_fetches_crumb_once_and_maps_modules() {
        let client = Arc::new(
            ScriptedHttpClient::new()
                .on("fc.yahoo.com", HttpResponse::with_status(404, ""))
                .on("getcrumb", HttpResponse::ok_json("abcDEF123"))
                .on("quoteSummary/AAPL", HttpResponse::ok_json(SUMMARY_BODY)),
        );
        let adapter = adapter(&client);

        let info = adapter.fetch_info(&aapl()).await.expect("info");
        let _ = adapter.fetch_info(&aapl()).await.expect("info");

        assert_eq!(info.name.as_deref(), Some("Apple Inc."));
        assert_eq!(info.sector.as_deref(), Some("Technology"));
        assert_eq!(info.market_cap, Some(2.9e12));
        assert_eq!(info.pe_ratio, Some(29.1));
        assert_eq!(info.forward_pe, Some(27.4));
        assert_eq!(client.count_matching("getcrumb"), 1);
        assert!(client
            .recorded_requests()
            .iter()
            .any(|request| request.url.contains("crumb=abcDEF123")));
    }

    #[tokio::test]
    async fn rejected_crumb_is_refreshed_once() {
        let client = Arc::new(
            ScriptedHttpClient::new()
                .on("fc.yahoo.com", HttpResponse::with_status(404, ""))
                .on("getcrumb", HttpResponse::ok_json("stale"))
                .on("quoteSummary/AAPL", HttpResponse::with_status(401, "{}")),
        );

        let error = adapter(&client)
            .fetch_info(&aapl())
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert_eq!(client.count_matching("getcrumb"), 2);
        assert_eq!(client.count_matching("quoteSummary"), 2);
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_repeated_transport_failures() {
        let client = Arc::new(ScriptedHttpClient::new().fail_on("/chart/", HttpError::new("connection reset")));
        let adapter = adapter(&client);

        for _ in 0..3 {
            let error = adapter.fetch_quote(&aapl()).await.expect_err("call should fail");
            assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        }
        assert_eq!(adapter.circuit_state(), CircuitState::Open);

        let error = adapter.fetch_quote(&aapl()).await.expect_err("breaker should block");
        assert!(error.message().contains("circuit breaker is open"));
        assert_eq!(client.recorded_requests().len(), 3);
    }

    #[test]
    fn supported_combinations_follow_intraday_retention() {
        let client = Arc::new(ScriptedHttpClient::new());
        let adapter = adapter(&client);

        assert!(adapter.supports(Period::FiveDays, Interval::OneMinute));
        assert!(!adapter.supports(Period::OneMonth, Interval::OneMinute));
        assert!(adapter.supports(Period::OneMonth, Interval::FiveMinutes));
        assert!(!adapter.supports(Period::OneYear, Interval::FifteenMinutes));
        assert!(adapter.supports(Period::TwoYears, Interval::OneHour));
        assert!(!adapter.supports(Period::Max, Interval::SixtyMinutes));
        assert!(adapter.supports(Period::Max, Interval::OneMonth));
    }
}
