//! Provider adapters.

mod alphavantage;
mod yahoo;

pub use alphavantage::AlphaVantageAdapter;
pub use yahoo::YahooAdapter;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::provider::SourceError;
use crate::provider_policy::ProviderPolicy;
use crate::ProviderId;

/// Transport plus circuit breaker for one provider.
///
/// Transport failures, 429 and 5xx responses count as breaker failures; any
/// other response closes the breaker and is handed back for the adapter to
/// interpret.
#[derive(Clone)]
pub(crate) struct Upstream {
    provider: ProviderId,
    http_client: Arc<dyn HttpClient>,
    breaker: Arc<CircuitBreaker>,
}

impl Upstream {
    pub(crate) fn new(provider: ProviderId, http_client: Arc<dyn HttpClient>) -> Self {
        let policy = ProviderPolicy::default_for(provider);
        Self {
            provider,
            http_client,
            breaker: Arc::new(CircuitBreaker::new(provider, policy.circuit_breaker)),
        }
    }

    pub(crate) fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fails while the breaker is open, without touching the network or the
    /// breaker state.
    pub(crate) fn ready(&self) -> Result<(), SourceError> {
        match self.breaker.open_for() {
            Some(remaining) => Err(self.open_error(remaining)),
            None => Ok(()),
        }
    }

    pub(crate) async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
        if let Err(remaining) = self.breaker.check() {
            return Err(self.open_error(remaining));
        }

        debug!(provider = %self.provider, url = %request.redacted_url(), "upstream request");
        let response = self.http_client.execute(request).await.map_err(|error| {
            self.breaker.record_failure();
            let detail = if error.timed_out() {
                "timed out"
            } else {
                "transport error"
            };
            SourceError::unavailable(format!("{} {detail}: {}", self.provider, error.message()))
        })?;

        if response.status == 429 {
            self.breaker.record_failure();
            return Err(SourceError::rate_limited(format!(
                "{} responded 429 Too Many Requests",
                self.provider
            )));
        }

        if response.status >= 500 {
            self.breaker.record_failure();
            return Err(SourceError::unavailable(format!(
                "{} upstream returned status {}",
                self.provider, response.status
            )));
        }

        self.breaker.record_success();
        Ok(response)
    }

    fn open_error(&self, remaining: Duration) -> SourceError {
        SourceError::unavailable(format!(
            "{} circuit breaker is open; retry in {}s",
            self.provider,
            remaining.as_secs().max(1)
        ))
    }

    /// Body of a 2xx response; 404 means the symbol is unknown.
    pub(crate) fn success_body(&self, response: HttpResponse) -> Result<String, SourceError> {
        match response.status {
            status if (200..300).contains(&status) => Ok(response.body),
            404 => Err(SourceError::no_data(format!(
                "{} has no data for this symbol",
                self.provider
            ))),
            status => Err(SourceError::unavailable(format!(
                "{} upstream returned status {status}",
                self.provider
            ))),
        }
    }
}
