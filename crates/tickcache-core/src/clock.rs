//! Time source used by the rate limiter and the cache.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::UtcDateTime;

pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> UtcDateTime;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<UtcDateTime>>,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock lock is not poisoned");
        *now = now.plus(by);
    }

    pub fn set(&self, to: UtcDateTime) {
        *self.now.lock().expect("manual clock lock is not poisoned") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().expect("manual clock lock is not poisoned")
    }
}

pub(crate) fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_is_shared_between_clones() {
        let start = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("timestamp");
        let clock = ManualClock::new(start);
        let shared = clock.clone();

        clock.advance(Duration::from_secs(61));

        assert_eq!(
            shared.now(),
            UtcDateTime::parse("2024-01-01T00:01:01Z").expect("timestamp")
        );
    }
}
