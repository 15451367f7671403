//! The two pipeline handlers `fep-hosting` supplies itself rather than
//! importing from a component crate: the DUPLICATE_CHECK stage adapter
//! around `fep-dedup`, and the AUDIT stage adapter that ties together
//! persistence (§6), limit-usage recording/reversal (§4.9, P6), and the
//! audit log (§4.11).
use std::sync::Arc;

use async_trait::async_trait;
use fep_core::error::TransactionError;
use fep_core::model::TransactionType;
use fep_core::observability;
use fep_core::repository::{TransactionRecord, TransactionRepository, TransactionStatus};
use fep_dedup::DuplicateChecker;
use fep_limits::LimitManager;
use fep_pipeline::{Handler, PipelineContext, Stage};
use tracing::warn;

/// Installed into DUPLICATE_CHECK (§4.6, P5). A straight pass-through to
/// `fep_dedup::DuplicateChecker::validate` — the checker already returns the
/// right `TransactionError`, so there is nothing for this adapter to add.
pub struct DuplicateCheckHandler {
    pub checker: Arc<DuplicateChecker>,
}

#[async_trait]
impl Handler for DuplicateCheckHandler {
    fn stage(&self) -> Stage {
        Stage::DuplicateCheck
    }

    fn name(&self) -> &str {
        "duplicate_check"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        self.checker.validate(&ctx.request)
    }
}

/// Installed into AUDIT (§4.7: "AUDIT always runs"). Persists the outcome,
/// records limit usage on approval, reverses it on an approved reversal (P6),
/// and emits the structured audit event.
pub struct AuditHandler {
    pub repository: Arc<dyn TransactionRepository>,
    pub limits: Arc<LimitManager>,
}

#[async_trait]
impl Handler for AuditHandler {
    fn stage(&self) -> Stage {
        Stage::Audit
    }

    fn name(&self) -> &str {
        "audit"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        let Some(response) = ctx.response.clone() else {
            // Every path through `Pipeline::execute` sets a response before
            // AUDIT runs (an approval, a decline, or the cancellation
            // short-circuit) — there is nothing sensible to audit otherwise.
            return Ok(());
        };

        observability::audit_event(&response.transaction_id.to_string(), response.response_code, response.approved);

        let status = if response.approved { TransactionStatus::Completed } else { TransactionStatus::Declined };
        if let Err(error) = self
            .repository
            .save(TransactionRecord {
                transaction_id: response.transaction_id,
                rrn: response.rrn.clone(),
                status,
                response: response.clone(),
            })
            .await
        {
            warn!(%error, "failed to persist transaction record");
        }

        if response.approved {
            if let Some(customer_id) = ctx.request.customer_id.clone() {
                self.limits.record_usage(ctx.request.transaction_id, &customer_id, &ctx.request.transaction_type, &ctx.request.amount);
            }
            if ctx.request.transaction_type == TransactionType::Reversal {
                if let Some(original) = ctx.request.original_transaction_id {
                    self.limits.reverse_usage(original);
                }
            }
        }

        Ok(())
    }
}
