//! The processor capability trait (§9 design note: "a capability interface
//! `{Validate, PreProcess, DoProcess, PostProcess}` with default no-op
//! implementations ... No inheritance required").
use async_trait::async_trait;
use fep_core::error::TransactionError;
use fep_pipeline::PipelineContext;

/// A single transaction type's business logic. Domain processor bodies
/// (withdrawal, transfer, bill-payment, ...) are out of scope (§1); this
/// trait is the contract they implement, and `fep-processors` supplies only
/// the router that dispatches to whatever implementation is registered.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Type-specific validation beyond the generic VALIDATION stage (§4.9) —
    /// e.g. a transfer processor checking that source and destination
    /// accounts differ. Default: no additional checks.
    async fn validate(&self, _ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        Ok(())
    }

    /// Work to perform before the core operation — e.g. reserving a hold.
    /// Default: nothing.
    async fn pre_process(&self, _ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        Ok(())
    }

    /// The core operation. Every concrete processor must implement this —
    /// it is the one step with no sensible no-op default.
    async fn do_process(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError>;

    /// Work to perform after the core operation succeeds — e.g. releasing a
    /// hold, appending a ledger reference. Default: nothing.
    async fn post_process(&self, _ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        Ok(())
    }
}
