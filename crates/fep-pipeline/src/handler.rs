use async_trait::async_trait;
use fep_core::error::TransactionError;

use crate::context::PipelineContext;
use crate::stage::Stage;

/// A single unit of work within one [`Stage`] (§4.7). `order` breaks ties
/// between handlers registered to the same stage — ascending, lowest first.
///
/// Returning `Err` is a clean decline (§4.7: "a handler throwing a typed
/// transaction exception"): the pipeline builds the error response from the
/// `TransactionError`'s response code, clears `continue_chain`, and notifies
/// `on_error` before proceeding straight to AUDIT.
#[async_trait]
pub trait Handler: Send + Sync {
    fn stage(&self) -> Stage;

    fn order(&self) -> i32 {
        0
    }

    fn name(&self) -> &str;

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError>;
}
