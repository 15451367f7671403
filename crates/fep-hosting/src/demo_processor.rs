//! A minimal `Processor` implementation used to assemble a runnable system
//! out of the box. Domain processor bodies (the actual withdrawal, transfer,
//! and bill-payment logic) are out of scope (§1) — `fep-processors` supplies
//! only the trait and the router, so without something registered behind
//! it every request would decline at ROUTING with `TRANSACTION_NOT_PERMITTED`
//! before ever reaching PROCESSING. `DemoProcessor` is the same kind of
//! stand-in as `codec::LineJsonCodec`: enough to approve a well-formed
//! request end to end so the pipeline, limits, dedup, and audit stages can
//! be exercised without a real core-banking host behind them.
use async_trait::async_trait;
use fep_core::error::TransactionError;
use fep_core::model::TransactionResponse;
use fep_pipeline::PipelineContext;
use fep_processors::Processor;

/// Approves every request it sees, deriving an authorization code from the
/// request's own STAN so repeated demo runs produce distinguishable codes.
pub struct DemoProcessor;

#[async_trait]
impl Processor for DemoProcessor {
    async fn do_process(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        let authorization_code = format!("A{}", &ctx.request.stan);
        ctx.response = Some(TransactionResponse::approve(
            ctx.request.transaction_id,
            ctx.request.rrn.clone(),
            ctx.request.stan.clone(),
            authorization_code,
        ));
        Ok(())
    }
}
