//! Thin façade over `tracing` so components log structured fields the same
//! way rather than each inventing its own event shape. Carried as an ambient
//! concern independent of any feature Non-goal — a system this latency- and
//! correctness-sensitive is not observable without it.
use tracing::{field, Level};

/// Emits a structured pipeline-stage transition event at `debug` level.
pub fn stage_event(stage: &str, transaction_id: &str, outcome: &str) {
    tracing::event!(
        Level::DEBUG,
        stage,
        transaction_id,
        outcome,
        "pipeline stage transition"
    );
}

/// Emits a structured connection state-transition event at `info` level —
/// every legal [`crate::model::ConnectionState`] move is logged so P2
/// (state-machine legality) is auditable from logs alone, not just tests.
pub fn connection_state_event(channel_id: &str, from: &str, to: &str) {
    tracing::event!(
        Level::INFO,
        channel_id,
        from,
        to,
        "connection state transition"
    );
}

/// Emits a structured audit event. `approved` is recorded as an explicit
/// field (rather than folded into the message) so the audit log can be
/// machine-filtered by outcome.
pub fn audit_event(transaction_id: &str, response_code: &str, approved: bool) {
    tracing::event!(
        target: "fep_audit",
        Level::INFO,
        transaction_id,
        response_code,
        approved,
        channel = field::Empty,
        "transaction audited"
    );
}
