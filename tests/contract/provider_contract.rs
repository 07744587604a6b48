//! Contract every provider adapter must honor, checked against canned
//! upstream responses.
//!
//! The fetcher relies on these mappings: transport failures and 5xx become
//! `Unavailable`, upstream throttling becomes `RateLimited`, and an empty
//! payload is `NoData` rather than an empty success.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tickcache_core::{
    AlphaVantageAdapter, Endpoint, HistoryQuery, HttpClient, HttpError, HttpRequest,
    HttpResponse, Indicator, IndicatorQuery, Interval, ManualClock, Period, ProviderClient,
    ProviderId, SeriesType, SourceError, SourceErrorKind, Symbol, UtcDateTime, YahooAdapter,
};

// =============================================================================
// Test doubles
// =============================================================================

type Reply = Result<HttpResponse, HttpError>;

/// Answers by URL fragment, falling back to one default reply.
struct CannedHttpClient {
    routes: Vec<(&'static str, Reply)>,
    fallback: Reply,
    seen: Mutex<Vec<String>>,
}

impl CannedHttpClient {
    fn always(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            routes: Vec::new(),
            fallback: reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn routed(routes: Vec<(&'static str, Reply)>) -> Arc<Self> {
        Arc::new(Self {
            routes,
            fallback: Ok(HttpResponse::with_status(404, "")),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.seen.lock().expect("lock").clone()
    }
}

impl HttpClient for CannedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.seen.lock().expect("lock").push(request.url.clone());
            self.routes
                .iter()
                .find(|(fragment, _)| request.url.contains(fragment))
                .map_or_else(|| self.fallback.clone(), |(_, reply)| reply.clone())
        })
    }
}

fn ts(value: &str) -> UtcDateTime {
    UtcDateTime::parse(value).expect("timestamp")
}

fn symbol() -> Symbol {
    Symbol::parse("IBM").expect("valid symbol")
}

fn yahoo(http: Arc<CannedHttpClient>) -> Box<dyn ProviderClient> {
    Box::new(
        YahooAdapter::with_http_client(http)
            .with_clock(Arc::new(ManualClock::new(ts("2024-03-02T12:00:00Z")))),
    )
}

fn alphavantage(http: Arc<CannedHttpClient>) -> Box<dyn ProviderClient> {
    Box::new(
        AlphaVantageAdapter::with_http_client(http, "contract-key")
            .with_clock(Arc::new(ManualClock::new(ts("2024-03-02T12:00:00Z")))),
    )
}

type Factory = fn(Arc<CannedHttpClient>) -> Box<dyn ProviderClient>;

const ADAPTERS: [(ProviderId, Factory); 2] = [
    (ProviderId::Yahoo, yahoo),
    (ProviderId::Alphavantage, alphavantage),
];

const ENDPOINTS: [Endpoint; 3] = [Endpoint::History, Endpoint::Info, Endpoint::Quote];

async fn call(adapter: &dyn ProviderClient, endpoint: Endpoint) -> Result<(), SourceError> {
    let symbol = symbol();
    match endpoint {
        Endpoint::History => {
            let query = HistoryQuery::new(symbol, Period::OneMonth, Interval::OneDay);
            adapter.fetch_history(&query).await.map(|_| ())
        }
        Endpoint::Info => adapter.fetch_info(&symbol).await.map(|_| ()),
        Endpoint::Quote => adapter.fetch_quote(&symbol).await.map(|_| ()),
        Endpoint::Indicator => {
            let query = IndicatorQuery {
                symbol,
                indicator: Indicator::Sma,
                interval: Interval::OneDay,
                time_period: 10,
                series_type: SeriesType::Close,
            };
            adapter.fetch_indicator(&query).await.map(|_| ())
        }
    }
}

/// Runs every endpoint of every adapter against a fresh client built from
/// `reply` and asserts the resulting error kind.
async fn assert_every_call_fails_with(reply: Reply, expected: SourceErrorKind) {
    for (provider, factory) in ADAPTERS {
        for endpoint in ENDPOINTS {
            let adapter = factory(CannedHttpClient::always(reply.clone()));
            let error = call(adapter.as_ref(), endpoint)
                .await
                .expect_err("canned failure must surface");
            assert_eq!(
                error.kind(),
                expected,
                "{provider} {endpoint:?}: {error}"
            );
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

#[test]
fn every_adapter_reports_its_id_and_full_capabilities() {
    for (provider, factory) in ADAPTERS {
        let adapter = factory(CannedHttpClient::always(Ok(HttpResponse::ok_json("{}"))));
        assert_eq!(adapter.id(), provider);
        for endpoint in ENDPOINTS {
            assert!(adapter.capabilities().supports(endpoint));
        }
        assert!(adapter.supports(Period::OneYear, Interval::OneDay));
        assert!(!adapter.supports(Period::Max, Interval::OneMinute));
        assert_eq!(
            adapter.capabilities().supports(Endpoint::Indicator),
            adapter.supports_indicator(Interval::OneDay),
            "{provider}"
        );
    }
}

#[tokio::test]
async fn only_alphavantage_computes_indicators() {
    let http = CannedHttpClient::always(Ok(HttpResponse::ok_json("{}")));

    let error = call(yahoo(http.clone()).as_ref(), Endpoint::Indicator)
        .await
        .expect_err("yahoo has no indicators");
    assert_eq!(error.kind(), SourceErrorKind::UnsupportedEndpoint);
    assert!(http.urls().is_empty());

    let adapter = alphavantage(http.clone());
    assert!(adapter.capabilities().supports(Endpoint::Indicator));
    let error = call(adapter.as_ref(), Endpoint::Indicator)
        .await
        .expect_err("empty analysis");
    assert_eq!(error.kind(), SourceErrorKind::NoData);
    assert!(http.urls()[0].contains("function=SMA"));
}

// =============================================================================
// Failure mapping
// =============================================================================

#[tokio::test]
async fn when_transport_times_out_every_adapter_reports_unavailable() {
    assert_every_call_fails_with(
        Err(HttpError::timeout("deadline exceeded")),
        SourceErrorKind::Unavailable,
    )
    .await;
}

#[tokio::test]
async fn when_upstream_fails_with_5xx_every_adapter_reports_unavailable() {
    assert_every_call_fails_with(
        Ok(HttpResponse::with_status(503, "Service Unavailable")),
        SourceErrorKind::Unavailable,
    )
    .await;
}

#[tokio::test]
async fn when_upstream_answers_429_every_adapter_reports_rate_limited() {
    assert_every_call_fails_with(
        Ok(HttpResponse::with_status(429, "Too Many Requests")),
        SourceErrorKind::RateLimited,
    )
    .await;
}

#[tokio::test]
async fn when_alphavantage_sends_throttle_note_adapter_reports_rate_limited() {
    let note = r#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
    for endpoint in ENDPOINTS {
        let adapter = alphavantage(CannedHttpClient::always(Ok(HttpResponse::ok_json(note))));
        let error = call(adapter.as_ref(), endpoint).await.expect_err("throttled");
        assert_eq!(error.kind(), SourceErrorKind::RateLimited, "{endpoint:?}");
    }
}

// =============================================================================
// Empty payloads
// =============================================================================

#[tokio::test]
async fn when_alphavantage_payload_is_empty_adapter_reports_no_data() {
    for endpoint in ENDPOINTS {
        let adapter = alphavantage(CannedHttpClient::always(Ok(HttpResponse::ok_json("{}"))));
        let error = call(adapter.as_ref(), endpoint).await.expect_err("empty");
        assert_eq!(error.kind(), SourceErrorKind::NoData, "{endpoint:?}");
    }
}

#[tokio::test]
async fn when_yahoo_payload_is_empty_adapter_reports_no_data() {
    let http = CannedHttpClient::routed(vec![
        (
            "/chart/",
            Ok(HttpResponse::ok_json(r#"{"chart":{"result":[],"error":null}}"#)),
        ),
        ("getcrumb", Ok(HttpResponse::ok_json("abcDEF123"))),
        (
            "quoteSummary",
            Ok(HttpResponse::ok_json(
                r#"{"quoteSummary":{"result":[],"error":null}}"#,
            )),
        ),
    ]);

    for endpoint in ENDPOINTS {
        let adapter = yahoo(http.clone());
        let error = call(adapter.as_ref(), endpoint).await.expect_err("empty");
        assert_eq!(error.kind(), SourceErrorKind::NoData, "{endpoint:?}");
    }
}

// =============================================================================
// Row ordering
// =============================================================================

#[tokio::test]
async fn every_adapter_returns_rows_strictly_ascending() {
    let yahoo_chart = r#"{"chart":{"result":[{
        "meta":{"currency":"USD","symbol":"IBM","regularMarketPrice":187.97},
        "timestamp":[1709251200,1709164800,1709078400,1709251200],
        "indicators":{"quote":[{
            "open":[185.49,184.31,185.0,185.49],
            "high":[188.38,186.51,186.2,188.38],
            "low":[185.18,183.72,184.1,185.18],
            "close":[187.97,185.03,185.5,187.97],
            "volume":[4511340,6458487,5010000,4511340]}]}}],"error":null}}"#;
    let av_daily = r#"{
        "Time Series (Daily)": {
            "2024-02-28": {"1. open": "185.0", "2. high": "186.2", "3. low": "184.1", "4. close": "185.5", "5. volume": "5010000"},
            "2024-03-01": {"1. open": "185.49", "2. high": "188.38", "3. low": "185.18", "4. close": "187.97", "5. volume": "4511340"},
            "2024-02-29": {"1. open": "184.31", "2. high": "186.51", "3. low": "183.72", "4. close": "185.03", "5. volume": "6458487"}
        }
    }"#;

    let cases: [(Factory, &str); 2] = [(yahoo, yahoo_chart), (alphavantage, av_daily)];
    for (factory, body) in cases {
        let http = CannedHttpClient::always(Ok(HttpResponse::ok_json(body)));
        let adapter = factory(http.clone());
        let query = HistoryQuery::new(symbol(), Period::OneMonth, Interval::OneDay);

        let series = adapter.fetch_history(&query).await.expect("history");

        assert_eq!(series.len(), 3, "{}", adapter.id());
        assert!(series.rows.windows(2).all(|pair| pair[0].date < pair[1].date));
        assert_eq!(series.last_close(), Some(187.97));
        assert_eq!(http.urls().len(), 1);
    }
}

#[tokio::test]
async fn alphavantage_sends_api_key_but_never_in_redacted_form() {
    let http = CannedHttpClient::always(Ok(HttpResponse::ok_json("{}")));
    let adapter = alphavantage(http.clone());
    let _ = call(adapter.as_ref(), Endpoint::Quote).await;

    let urls = http.urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].contains("apikey=contract-key"));

    let redacted = HttpRequest::get(urls[0].clone()).redacted_url();
    assert!(!redacted.contains("contract-key"));
}
