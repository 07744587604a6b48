//! Per-provider call budgets.
//!
//! [`RateLimiter`] owns the quota accounting for providers that declare one
//! (a rolling 60 second window plus a UTC calendar-day counter). Providers
//! without a quota are always allowed. Separately, [`Pacer`] spaces calls to
//! free endpoints with a governor token bucket.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use serde::Serialize;
use time::Date;

use crate::clock::{system_clock, Clock};
use crate::provider_policy::{ProviderPolicy, QuotaPolicy};
use crate::{ProviderId, UtcDateTime};

const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Allowed,
    Denied { retry_after: Duration },
}

impl Permit {
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Snapshot of a provider's budget consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateUsage {
    pub provider: ProviderId,
    pub calls_last_minute: u32,
    pub calls_today: u32,
    pub minute_limit: Option<u32>,
    pub daily_limit: Option<u32>,
    pub minute_remaining: Option<u32>,
    pub daily_remaining: Option<u32>,
}

#[derive(Debug)]
struct RateBudget {
    recent_calls: VecDeque<UtcDateTime>,
    calls_today: u32,
    day: Date,
}

impl RateBudget {
    fn new(now: UtcDateTime) -> Self {
        Self {
            recent_calls: VecDeque::new(),
            calls_today: 0,
            day: now.date(),
        }
    }

    fn roll_forward(&mut self, now: UtcDateTime) {
        while let Some(oldest) = self.recent_calls.front() {
            if now.since(*oldest) >= MINUTE_WINDOW {
                self.recent_calls.pop_front();
            } else {
                break;
            }
        }

        if now.date() != self.day {
            self.day = now.date();
            self.calls_today = 0;
        }
    }

    fn check(&self, quota: QuotaPolicy, now: UtcDateTime) -> Permit {
        let mut retry_after: Option<Duration> = None;

        if self.recent_calls.len() >= quota.per_minute as usize {
            let oldest = self.recent_calls.front().copied().unwrap_or(now);
            let wait = MINUTE_WINDOW.saturating_sub(now.since(oldest));
            retry_after = Some(wait);
        }

        if self.calls_today >= quota.per_day {
            let wait = until_next_utc_midnight(now);
            retry_after = Some(retry_after.map_or(wait, |minute| minute.max(wait)));
        }

        match retry_after {
            Some(retry_after) => Permit::Denied { retry_after },
            None => Permit::Allowed,
        }
    }

    fn record(&mut self, now: UtcDateTime) {
        self.recent_calls.push_back(now);
        self.calls_today = self.calls_today.saturating_add(1);
    }
}

/// Shared call-budget tracker. Clones share state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    quotas: HashMap<ProviderId, QuotaPolicy>,
    budgets: Arc<Mutex<HashMap<ProviderId, RateBudget>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_clock(system_clock())
    }
}

impl RateLimiter {
    /// Limiter with each provider's default policy.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let quotas = ProviderId::ALL
            .into_iter()
            .filter_map(|provider| {
                ProviderPolicy::default_for(provider)
                    .quota
                    .map(|quota| (provider, quota))
            })
            .collect();
        Self::new(clock, quotas)
    }

    pub fn new(clock: Arc<dyn Clock>, quotas: HashMap<ProviderId, QuotaPolicy>) -> Self {
        Self {
            clock,
            quotas,
            budgets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn quota(&self, provider: ProviderId) -> Option<QuotaPolicy> {
        self.quotas.get(&provider).copied()
    }

    /// Whether a call to `provider` may proceed right now. Does not consume budget.
    pub fn permit(&self, provider: ProviderId) -> Permit {
        let Some(quota) = self.quota(provider) else {
            return Permit::Allowed;
        };

        let now = self.clock.now();
        let mut budgets = self.lock();
        let budget = budgets
            .entry(provider)
            .or_insert_with(|| RateBudget::new(now));
        budget.roll_forward(now);
        budget.check(quota, now)
    }

    /// Counts one network call against `provider`.
    pub fn record_call(&self, provider: ProviderId) {
        if !self.quotas.contains_key(&provider) {
            return;
        }

        let now = self.clock.now();
        let mut budgets = self.lock();
        let budget = budgets
            .entry(provider)
            .or_insert_with(|| RateBudget::new(now));
        budget.roll_forward(now);
        budget.record(now);
    }

    /// Checks and consumes budget under one lock.
    pub fn try_acquire(&self, provider: ProviderId) -> Permit {
        let Some(quota) = self.quota(provider) else {
            return Permit::Allowed;
        };

        let now = self.clock.now();
        let mut budgets = self.lock();
        let budget = budgets
            .entry(provider)
            .or_insert_with(|| RateBudget::new(now));
        budget.roll_forward(now);

        let permit = budget.check(quota, now);
        if permit.is_allowed() {
            budget.record(now);
        }
        permit
    }

    pub fn usage(&self, provider: ProviderId) -> RateUsage {
        let quota = self.quota(provider);
        let now = self.clock.now();

        let (calls_last_minute, calls_today) = {
            let mut budgets = self.lock();
            match budgets.get_mut(&provider) {
                Some(budget) => {
                    budget.roll_forward(now);
                    (budget.recent_calls.len() as u32, budget.calls_today)
                }
                None => (0, 0),
            }
        };

        RateUsage {
            provider,
            calls_last_minute,
            calls_today,
            minute_limit: quota.map(|quota| quota.per_minute),
            daily_limit: quota.map(|quota| quota.per_day),
            minute_remaining: quota.map(|quota| quota.per_minute.saturating_sub(calls_last_minute)),
            daily_remaining: quota.map(|quota| quota.per_day.saturating_sub(calls_today)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ProviderId, RateBudget>> {
        self.budgets
            .lock()
            .expect("rate budget lock is not poisoned")
    }
}

fn until_next_utc_midnight(now: UtcDateTime) -> Duration {
    now.date()
        .next_day()
        .map(|tomorrow| UtcDateTime::start_of_day(tomorrow).since(now))
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token-bucket pacer keeping calls at least `spacing` apart.
#[derive(Clone)]
pub struct Pacer {
    limiter: Arc<DirectRateLimiter>,
    spacing: Duration,
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer").field("spacing", &self.spacing).finish()
    }
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        let quota = Quota::with_period(spacing.max(Duration::from_millis(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(governor::RateLimiter::direct(quota)),
            spacing,
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Option<Self> {
        policy.min_spacing.map(Self::new)
    }

    /// Waits until the next call slot.
    pub async fn ready(&self) {
        self.limiter.until_ready().await;
    }
}
