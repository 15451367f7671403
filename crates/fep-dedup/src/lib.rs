//! C6: the duplicate transaction checker (`spec.md` §4.6). Fingerprints a
//! request by its RRN/STAN/terminal triple and rejects a repeat within the
//! retention window (P5), using a `DashMap<Fingerprint, Instant>` bounded by
//! an LRU side index so memory stays flat under sustained traffic.
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fep_core::error::codes;
use fep_core::error::TransactionError;
use fep_core::model::TransactionRequest;
use fep_core::time::Clock;
use lru::LruCache;

/// Default capacity for the LRU side index when the caller has no better
/// estimate of sustained in-flight volume.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Derived from a request's RRN, STAN, and originating terminal — the triple
/// named in §4.6 as uniquely identifying a retry of the same transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_request(request: &TransactionRequest) -> Self {
        Self(format!("{}|{}|{}", request.rrn, request.stan, request.terminal_id))
    }
}

pub struct DuplicateChecker {
    entries: DashMap<Fingerprint, Instant>,
    lru: Mutex<LruCache<Fingerprint, ()>>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl DuplicateChecker {
    pub fn new(clock: Arc<dyn Clock>, retention: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            entries: DashMap::new(),
            lru: Mutex::new(LruCache::new(capacity)),
            retention,
            clock,
        }
    }

    /// Resolves the open question in §9: retention defaults to 4x the
    /// largest configured per-transaction-type timeout, so a transaction
    /// cannot be retried (and thus mistaken for a duplicate) before its own
    /// worst-case timeout has had several chances to fire.
    pub fn retention_from_timeout_defaults(per_type_timeouts_ms: impl IntoIterator<Item = u64>) -> Duration {
        let largest = per_type_timeouts_ms.into_iter().max().unwrap_or(10_000);
        Duration::from_millis(largest.saturating_mul(4))
    }

    /// §4.6/P5: rejects a fingerprint seen within the retention window with
    /// `DUPLICATE_TRANSACTION` (`94`); otherwise records it and admits the
    /// request. Check-then-insert is serialized under the LRU mutex so two
    /// concurrent retries of the same fingerprint cannot both be admitted.
    pub fn validate(&self, request: &TransactionRequest) -> Result<(), TransactionError> {
        let fingerprint = Fingerprint::from_request(request);
        let now = self.clock.now();
        let mut lru = self.lru.lock().expect("duplicate-checker lru mutex poisoned");

        if let Some(seen_at) = self.entries.get(&fingerprint) {
            if now.saturating_duration_since(*seen_at) < self.retention {
                return Err(TransactionError::duplicate_transaction());
            }
        }

        if lru.len() >= lru.cap().get() && !lru.contains(&fingerprint) {
            if let Some((evicted, _)) = lru.pop_lru() {
                self.entries.remove(&evicted);
            }
        }
        lru.put(fingerprint.clone(), ());
        self.entries.insert(fingerprint, now);
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.lru.lock().expect("duplicate-checker lru mutex poisoned").clear();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

/// `response_code` used by the pipeline when a `TransactionError` surfaces
/// from [`DuplicateChecker::validate`] — re-exported so callers don't need
/// to depend on `fep-core::error::codes` just to match on it.
pub const DUPLICATE_RESPONSE_CODE: &str = codes::DUPLICATE_TRANSACTION;

#[cfg(test)]
mod tests {
    use super::*;
    use fep_core::ids::{TerminalId, TransactionId};
    use fep_core::model::{Money, TransactionType};

    struct FakeClock {
        now: Mutex<Instant>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self { now: Mutex::new(Instant::now()) }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn sample_request(rrn: &str, stan: &str, terminal: &str) -> TransactionRequest {
        TransactionRequest {
            transaction_id: TransactionId::new(),
            transaction_type: TransactionType::Withdrawal,
            processing_code: "010000".into(),
            pan: "4111111111111111".into(),
            expiry: Some("2901".into()),
            amount: Money::new(10_000, "USD"),
            source_account: None,
            destination_account: None,
            terminal_id: TerminalId::new(terminal),
            rrn: rrn.into(),
            stan: stan.into(),
            pin_block: None,
            acquiring_bank_code: None,
            channel_name: "ATM1".into(),
            customer_id: None,
            original_transaction_id: None,
            extensions: Default::default(),
        }
    }

    #[test]
    fn retention_defaults_to_4x_largest_timeout() {
        let window = DuplicateChecker::retention_from_timeout_defaults([5_000, 10_000, 30_000]);
        assert_eq!(window, Duration::from_millis(120_000));
    }

    #[test]
    fn repeat_within_window_is_rejected_p5() {
        let clock = Arc::new(FakeClock::new());
        let checker = DuplicateChecker::new(clock, Duration::from_secs(60), NonZeroUsize::new(16).unwrap());
        let request = sample_request("RRN1", "STAN1", "T1");
        checker.validate(&request).unwrap();
        let err = checker.validate(&request).unwrap_err();
        assert_eq!(err.response_code, DUPLICATE_RESPONSE_CODE);
    }

    #[test]
    fn repeat_after_window_elapses_is_admitted() {
        let clock = Arc::new(FakeClock::new());
        let checker = DuplicateChecker::new(clock.clone(), Duration::from_secs(60), NonZeroUsize::new(16).unwrap());
        let request = sample_request("RRN2", "STAN2", "T2");
        checker.validate(&request).unwrap();
        clock.advance(Duration::from_secs(61));
        checker.validate(&request).unwrap();
    }

    #[test]
    fn distinct_fingerprints_never_collide() {
        let clock = Arc::new(FakeClock::new());
        let checker = DuplicateChecker::new(clock, Duration::from_secs(60), NonZeroUsize::new(16).unwrap());
        checker.validate(&sample_request("RRN3", "STAN3", "T3")).unwrap();
        checker.validate(&sample_request("RRN4", "STAN3", "T3")).unwrap();
    }

    #[test]
    fn lru_eviction_forgets_the_oldest_fingerprint() {
        let clock = Arc::new(FakeClock::new());
        let checker = DuplicateChecker::new(clock, Duration::from_secs(3_600), NonZeroUsize::new(2).unwrap());
        checker.validate(&sample_request("A", "A", "A")).unwrap();
        checker.validate(&sample_request("B", "B", "B")).unwrap();
        checker.validate(&sample_request("C", "C", "C")).unwrap();
        assert_eq!(checker.size(), 2);
        // "A" was evicted, so it's treated as fresh rather than a duplicate.
        checker.validate(&sample_request("A", "A", "A")).unwrap();
    }

    #[test]
    fn clear_forgets_everything() {
        let clock = Arc::new(FakeClock::new());
        let checker = DuplicateChecker::new(clock, Duration::from_secs(60), NonZeroUsize::new(16).unwrap());
        let request = sample_request("RRN5", "STAN5", "T5");
        checker.validate(&request).unwrap();
        checker.clear();
        assert_eq!(checker.size(), 0);
        checker.validate(&request).unwrap();
    }
}
