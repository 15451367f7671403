//! A minimal clock abstraction so the timeout manager and duplicate checker
//! can be tested with deterministic time instead of real sleeps.
use std::time::Instant;

use chrono::NaiveDate;

/// Anything that can report "now". Production code uses [`SystemClock`];
/// tests use a fake that advances on command.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The real clock, backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A calendar-date source, distinct from [`Clock`]: the limit manager's
/// daily/monthly counters and the scheduled-transfer sweep (§4.9/§4.10) both
/// reason about wall-clock calendar dates, not monotonic instants, and both
/// need a fake for deterministic tests (scenario 5: "call sweep with today's
/// date twice").
pub trait DateProvider: Send + Sync + 'static {
    fn today(&self) -> NaiveDate;
}

/// The real calendar, backed by the local date.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemDateProvider;

impl DateProvider for SystemDateProvider {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::Clock;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// A clock that only moves when told to, for exercising timeout-manager
    /// edge cases without sleeping in tests.
    pub struct FakeClock {
        now: Mutex<Instant>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut guard = self.now.lock().unwrap();
            *guard += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn system_date_provider_returns_a_plausible_date() {
        let today = SystemDateProvider.today();
        assert!(today.year() >= 2024);
    }
}
