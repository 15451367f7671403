//! The boundary between the scheduled-transfer sweep and the transaction
//! pipeline. `fep-scheduled` does not depend on `fep-pipeline` directly —
//! `fep-hosting` supplies an implementation that calls through to the real
//! `Pipeline::execute`, mirroring the `InboundHandler` seam `fep-transport-tcp`
//! uses to keep the transport layer decoupled from the pipeline crate.
use async_trait::async_trait;
use fep_core::model::{TransactionRequest, TransactionResponse};

#[async_trait]
pub trait TransactionSink: Send + Sync + 'static {
    async fn submit(&self, request: TransactionRequest) -> TransactionResponse;
}
