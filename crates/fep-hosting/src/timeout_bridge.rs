//! Bridges `fep-timeout`'s callback-based `TimeoutListener` to the
//! pipeline's cooperative `Cancellation` flag (C5/§4.5). `Pipeline::execute`
//! already polls `ctx.cancellation` before each stage and short-circuits to
//! an AUDIT-only pass with a `REQUEST_TIMEOUT` response; this listener's
//! only job is flipping that flag when `TimeoutManager` decides a
//! transaction has run out of time.
//!
//! Deliberately NOT implemented as `TimeoutManager::execute_with_timeout`
//! wrapping `pipeline.execute` — that method drops the `work` future on
//! expiry, which would lose the in-flight `PipelineContext` (and the AUDIT
//! stage's record of the timeout) entirely. Registering a `Cancellation`
//! here and awaiting `pipeline.execute` directly lets the pipeline's own
//! in-progress execution observe the cancellation and finish through AUDIT.
use dashmap::DashMap;
use fep_core::context::Cancellation;
use fep_core::ids::TransactionId;
use fep_timeout::{TimeoutContext, TimeoutListener};

#[derive(Default)]
pub struct CancellingTimeoutListener {
    tokens: DashMap<TransactionId, Cancellation>,
}

impl CancellingTimeoutListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before `pipeline.execute` starts tracking a transaction.
    pub fn register(&self, transaction_id: TransactionId, cancellation: Cancellation) {
        self.tokens.insert(transaction_id, cancellation);
    }

    /// Called once the pipeline has produced a final response, win or lose.
    /// Idempotent: a transaction that was never registered, or already
    /// unregistered, is simply absent from the map.
    pub fn unregister(&self, transaction_id: TransactionId) {
        self.tokens.remove(&transaction_id);
    }
}

impl TimeoutListener for CancellingTimeoutListener {
    fn on_timeout(&self, context: &TimeoutContext) {
        if let Some(token) = self.tokens.get(&context.transaction_id) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fep_core::model::TransactionType;
    use fep_timeout::TimeoutStatus;
    use std::time::Instant;

    fn context(transaction_id: TransactionId) -> TimeoutContext {
        TimeoutContext {
            transaction_id,
            transaction_type: TransactionType::Withdrawal,
            start: Instant::now(),
            timeout_ms: 1_000,
            status: TimeoutStatus::Expired,
        }
    }

    #[test]
    fn on_timeout_cancels_the_registered_token() {
        let bridge = CancellingTimeoutListener::new();
        let id = TransactionId::new();
        let token = Cancellation::new();
        bridge.register(id, token.clone());

        bridge.on_timeout(&context(id));

        assert!(token.is_cancelled());
    }

    #[test]
    fn on_timeout_for_an_unregistered_id_is_a_no_op() {
        let bridge = CancellingTimeoutListener::new();
        // Should not panic even though nothing was ever registered.
        bridge.on_timeout(&context(TransactionId::new()));
    }

    #[test]
    fn unregister_stops_future_cancellation() {
        let bridge = CancellingTimeoutListener::new();
        let id = TransactionId::new();
        let token = Cancellation::new();
        bridge.register(id, token.clone());
        bridge.unregister(id);

        bridge.on_timeout(&context(id));

        assert!(!token.is_cancelled());
    }
}
