use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::ProviderId;

/// Call budget declared by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub per_minute: u32,
    pub per_day: u32,
}

/// Static per-provider limits and pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    /// `None` means the provider declares no quota.
    pub quota: Option<QuotaPolicy>,
    /// Minimum spacing between network calls, enforced with a token bucket.
    pub min_spacing: Option<Duration>,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ProviderPolicy {
    /// Free-tier limits: 5 calls per minute, 25 per day.
    pub fn alphavantage_default() -> Self {
        Self {
            provider_id: ProviderId::Alphavantage,
            quota: Some(QuotaPolicy {
                per_minute: 5,
                per_day: 25,
            }),
            min_spacing: None,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    /// No declared quota; calls are spaced half a second apart.
    pub fn yahoo_default() -> Self {
        Self {
            provider_id: ProviderId::Yahoo,
            quota: None,
            min_spacing: Some(Duration::from_millis(500)),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Alphavantage => Self::alphavantage_default(),
            ProviderId::Yahoo => Self::yahoo_default(),
        }
    }

    pub fn without_spacing(mut self) -> Self {
        self.min_spacing = None;
        self
    }
}
