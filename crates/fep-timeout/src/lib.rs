//! C5: the timeout manager — a scheduling API independent of the pipeline
//! (`spec.md` §4.5). Tracks one [`TimeoutContext`] per in-flight
//! transaction, drives warning/timeout/complete callbacks off a single
//! shared 1s-granularity ticker, and guards blocking executions via
//! [`TimeoutManager::execute_with_timeout`].
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fep_core::error::FepError;
use fep_core::ids::TransactionId;
use fep_core::model::TransactionType;
use fep_core::time::Clock;
use tokio::task::JoinHandle;

/// The 1s-granularity ticker interval named in §4.5.
pub const MONITOR_TICK: Duration = Duration::from_millis(1_000);

/// Fallback default for a transaction type with no configured timeout.
const FALLBACK_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutStatus {
    Active,
    Warning,
    Expired,
    Completed,
}

/// Per-transaction tracking record (§3: `TimeoutContext`).
#[derive(Clone, Debug)]
pub struct TimeoutContext {
    pub transaction_id: TransactionId,
    pub transaction_type: TransactionType,
    pub start: Instant,
    pub timeout_ms: u64,
    pub status: TimeoutStatus,
}

impl TimeoutContext {
    /// Warning threshold is 80% of `timeout_ms`, per §4.5.
    pub fn warning_threshold_ms(&self) -> u64 {
        self.timeout_ms * 80 / 100
    }
}

/// Callbacks invoked at most once per transaction (P4): `on_warning` fires
/// zero or one time strictly before the terminal callback; exactly one of
/// `{on_timeout, on_complete}` fires for any tracked transaction.
pub trait TimeoutListener: Send + Sync + 'static {
    fn on_warning(&self, _ctx: &TimeoutContext) {}
    fn on_timeout(&self, _ctx: &TimeoutContext) {}
    fn on_complete(&self, _ctx: &TimeoutContext) {}
}

/// A listener that does nothing, for callers that only need
/// `execute_with_timeout`'s return-value semantics.
pub struct NoopListener;
impl TimeoutListener for NoopListener {}

pub struct TimeoutManager {
    defaults: DashMap<TransactionType, u64>,
    contexts: DashMap<TransactionId, TimeoutContext>,
    listener: Arc<dyn TimeoutListener>,
    clock: Arc<dyn Clock>,
    shutdown: AtomicBool,
}

impl TimeoutManager {
    pub fn new(clock: Arc<dyn Clock>, listener: Arc<dyn TimeoutListener>) -> Arc<Self> {
        let defaults = DashMap::new();
        defaults.insert(TransactionType::BalanceInquiry, 5_000);
        defaults.insert(TransactionType::FundsInquiry, 5_000);
        defaults.insert(TransactionType::Withdrawal, 10_000);
        defaults.insert(TransactionType::Transfer, 15_000);
        defaults.insert(TransactionType::BillPayment, 30_000);
        Arc::new(Self {
            defaults,
            contexts: DashMap::new(),
            listener,
            clock,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Rejects non-positive timeouts, per §4.5.
    pub fn set_default_timeout(&self, txn_type: TransactionType, ms: u64) -> Result<(), FepError> {
        if ms == 0 {
            return Err(FepError::config("per-transaction-type timeout must be positive"));
        }
        self.defaults.insert(txn_type, ms);
        Ok(())
    }

    pub fn default_timeout_ms(&self, txn_type: &TransactionType) -> u64 {
        self.defaults.get(txn_type).map(|v| *v).unwrap_or(FALLBACK_TIMEOUT_MS)
    }

    /// §4.5: creates a `TimeoutContext` and registers it for monitoring.
    pub fn start_tracking(
        &self,
        transaction_id: TransactionId,
        transaction_type: TransactionType,
        override_ms: Option<u64>,
    ) -> Result<(), FepError> {
        let ms = override_ms.unwrap_or_else(|| self.default_timeout_ms(&transaction_type));
        if ms == 0 {
            return Err(FepError::config("timeout override must be positive"));
        }
        self.contexts.insert(
            transaction_id,
            TimeoutContext {
                transaction_id,
                transaction_type,
                start: self.clock.now(),
                timeout_ms: ms,
                status: TimeoutStatus::Active,
            },
        );
        Ok(())
    }

    /// §4.5: marks `COMPLETED`, invokes `on_complete`, removes the context.
    /// A transaction already removed as `EXPIRED` by the monitor is a no-op
    /// here — `DashMap::remove`'s atomicity is what arbitrates the race, so
    /// `COMPLETED` never overwrites `EXPIRED`.
    pub fn complete_tracking(&self, transaction_id: TransactionId) {
        if self.shutdown.load(Ordering::Relaxed) {
            self.contexts.remove(&transaction_id);
            return;
        }
        if let Some((_, mut ctx)) = self.contexts.remove(&transaction_id) {
            ctx.status = TimeoutStatus::Completed;
            self.listener.on_complete(&ctx);
        }
    }

    /// Runs `work` to completion, enforcing `override_ms` (or the
    /// transaction type's default) as an absolute deadline. On expiry, the
    /// work future is dropped (cancelling it, to the extent the future
    /// cooperates with being dropped) and a `TimeoutError` is returned; on
    /// success, tracking completes normally and the result is returned.
    pub async fn execute_with_timeout<F, T>(
        self: &Arc<Self>,
        transaction_id: TransactionId,
        transaction_type: TransactionType,
        override_ms: Option<u64>,
        work: F,
    ) -> Result<T, FepError>
    where
        F: std::future::Future<Output = T>,
    {
        self.start_tracking(transaction_id, transaction_type, override_ms)?;
        let ms = override_ms.unwrap_or_else(|| self.default_timeout_ms(&transaction_type));

        tokio::select! {
            biased;
            result = work => {
                self.complete_tracking(transaction_id);
                Ok(result)
            }
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                self.force_expire(transaction_id);
                Err(FepError::request_timeout(format!(
                    "transaction {transaction_id} exceeded {ms}ms"
                )))
            }
        }
    }

    fn force_expire(&self, transaction_id: TransactionId) {
        if let Some((_, ctx)) = self.contexts.remove(&transaction_id) {
            if ctx.status != TimeoutStatus::Completed && !self.shutdown.load(Ordering::Relaxed) {
                self.listener.on_timeout(&ctx);
            }
        }
    }

    /// One pass of the monitor: promotes contexts past the warning
    /// threshold, expires contexts past their deadline. Exposed directly so
    /// tests can drive it deterministically against a fake clock instead of
    /// waiting on [`Self::spawn_monitor`]'s real ticker.
    pub fn check_once(&self) {
        if self.shutdown.load(Ordering::Relaxed) {
            return;
        }
        let now = self.clock.now();
        let mut to_warn = Vec::new();
        let mut to_expire = Vec::new();
        for entry in self.contexts.iter() {
            let ctx = entry.value();
            let elapsed_ms = now.saturating_duration_since(ctx.start).as_millis() as u64;
            if elapsed_ms >= ctx.timeout_ms {
                to_expire.push(ctx.transaction_id);
            } else if ctx.status == TimeoutStatus::Active && elapsed_ms >= ctx.warning_threshold_ms() {
                to_warn.push(ctx.transaction_id);
            }
        }

        for id in to_warn {
            if let Some(mut entry) = self.contexts.get_mut(&id) {
                if entry.status == TimeoutStatus::Active {
                    entry.status = TimeoutStatus::Warning;
                    let snapshot = entry.clone();
                    drop(entry);
                    self.listener.on_warning(&snapshot);
                }
            }
        }
        for id in to_expire {
            self.force_expire(id);
        }
    }

    /// Spawns the single shared 1s ticker named in §4.5/§5.
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MONITOR_TICK);
            loop {
                ticker.tick().await;
                this.check_once();
            }
        })
    }

    /// §4.5: no callback fires after shutdown; active contexts are dropped
    /// without notification.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.contexts.clear();
    }

    /// Never negative; 0 for an unknown transaction id.
    pub fn remaining_ms(&self, transaction_id: TransactionId) -> u64 {
        match self.contexts.get(&transaction_id) {
            Some(ctx) => {
                let elapsed = self.clock.now().saturating_duration_since(ctx.start).as_millis() as u64;
                ctx.timeout_ms.saturating_sub(elapsed)
            }
            None => 0,
        }
    }

    /// Count of non-terminal (active or warning) contexts, per §4.5's
    /// invariant that "active count reflects only non-terminal contexts".
    pub fn active_count(&self) -> usize {
        self.contexts
            .iter()
            .filter(|e| matches!(e.status, TimeoutStatus::Active | TimeoutStatus::Warning))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A clock that only moves when told to, so warning/expiry edges can be
    /// exercised deterministically instead of sleeping in tests.
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

    #[derive(Default)]
    struct Recorder {
        warnings: Mutex<Vec<TransactionId>>,
        timeouts: Mutex<Vec<TransactionId>>,
        completes: Mutex<Vec<TransactionId>>,
    }

    impl TimeoutListener for Recorder {
        fn on_warning(&self, ctx: &TimeoutContext) {
            self.warnings.lock().unwrap().push(ctx.transaction_id);
        }
        fn on_timeout(&self, ctx: &TimeoutContext) {
            self.timeouts.lock().unwrap().push(ctx.transaction_id);
        }
        fn on_complete(&self, ctx: &TimeoutContext) {
            self.completes.lock().unwrap().push(ctx.transaction_id);
        }
    }

    #[test]
    fn warning_then_timeout_fires_at_most_once_each_p4() {
        let clock = Arc::new(FakeClock::new());
        let recorder = Arc::new(Recorder::default());
        let manager = TimeoutManager::new(clock.clone(), recorder.clone());
        let id = TransactionId::new();
        manager.start_tracking(id, TransactionType::Withdrawal, Some(2_500)).unwrap();

        clock.advance(Duration::from_millis(2_000));
        manager.check_once();
        manager.check_once(); // second pass must not re-fire the warning
        assert_eq!(recorder.warnings.lock().unwrap().len(), 1);
        assert_eq!(recorder.timeouts.lock().unwrap().len(), 0);

        clock.advance(Duration::from_millis(600));
        manager.check_once();
        assert_eq!(recorder.timeouts.lock().unwrap().len(), 1);
        assert_eq!(recorder.completes.lock().unwrap().len(), 0);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn complete_after_expiry_does_not_fire_complete() {
        let clock = Arc::new(FakeClock::new());
        let recorder = Arc::new(Recorder::default());
        let manager = TimeoutManager::new(clock.clone(), recorder.clone());
        let id = TransactionId::new();
        manager.start_tracking(id, TransactionType::Withdrawal, Some(1_000)).unwrap();
        clock.advance(Duration::from_millis(1_500));
        manager.check_once();
        manager.complete_tracking(id);
        assert_eq!(recorder.completes.lock().unwrap().len(), 0);
        assert_eq!(recorder.timeouts.lock().unwrap().len(), 1);
    }

    #[test]
    fn remaining_time_is_zero_for_unknown_transaction() {
        let clock = Arc::new(FakeClock::new());
        let manager = TimeoutManager::new(clock, Arc::new(NoopListener));
        assert_eq!(manager.remaining_ms(TransactionId::new()), 0);
    }

    #[test]
    fn set_default_timeout_rejects_non_positive() {
        let clock = Arc::new(FakeClock::new());
        let manager = TimeoutManager::new(clock, Arc::new(NoopListener));
        assert!(manager.set_default_timeout(TransactionType::Withdrawal, 0).is_err());
    }

    #[tokio::test]
    async fn execute_with_timeout_returns_the_work_result_on_success() {
        let clock = Arc::new(FakeClock::new());
        let recorder = Arc::new(Recorder::default());
        let manager = TimeoutManager::new(clock, recorder.clone());
        let id = TransactionId::new();
        let result = manager
            .execute_with_timeout(id, TransactionType::BalanceInquiry, Some(1_000), async { 42 })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(recorder.completes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn execute_with_timeout_raises_timeout_error_on_expiry() {
        let clock = Arc::new(FakeClock::new());
        let recorder = Arc::new(Recorder::default());
        let manager = TimeoutManager::new(clock, recorder.clone());
        let id = TransactionId::new();
        let err = manager
            .execute_with_timeout(id, TransactionType::BalanceInquiry, Some(10), async {
                tokio::time::sleep(Duration::from_millis(500)).await;
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "timeout.request_timeout");
        assert_eq!(recorder.timeouts.lock().unwrap().len(), 1);
    }
}
