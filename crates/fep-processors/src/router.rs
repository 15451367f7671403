//! The ROUTING and PROCESSING stage handlers (§4.7/§4.8). `RoutingHandler`
//! looks up the target processor and records it on the context for
//! `ProcessingHandler` to pick up one stage later — the two are split
//! because routing and processing are distinct pipeline stages, not because
//! they have independent failure modes.
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use fep_core::error::TransactionError;
use fep_core::model::TransactionResponse;
use fep_pipeline::{Handler, PipelineContext, Stage};

use crate::processor::Processor;
use crate::registry::ProcessorRegistry;

const RESOLVED_PROCESSOR_KEY: &str = "fep_processors.resolved_processor";

struct ResolvedProcessor(Arc<dyn Processor>);

/// §4.8: "given a request, look up by `request.type`; if unknown, set
/// response to `TRANSACTION_NOT_PERMITTED (57)` and stop the pipeline; else
/// record the resolved processor in the context and continue."
pub struct RoutingHandler {
    pub registry: Arc<ProcessorRegistry>,
}

#[async_trait]
impl Handler for RoutingHandler {
    fn stage(&self) -> Stage {
        Stage::Routing
    }

    fn name(&self) -> &str {
        "processor_router"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        match self.registry.get(&ctx.request.transaction_type) {
            Some(processor) => {
                ctx.attributes.insert(RESOLVED_PROCESSOR_KEY, ResolvedProcessor(processor));
                Ok(())
            }
            None => Err(TransactionError::unsupported_transaction_type()),
        }
    }
}

/// §4.7: "the pipeline's PROCESSING handler calls them in that order" —
/// `validate`, `pre_process`, `do_process`, `post_process`. Measures
/// `processing_time_ms` across the whole sequence and stamps it onto
/// whatever response `do_process` produced.
pub struct ProcessingHandler;

#[async_trait]
impl Handler for ProcessingHandler {
    fn stage(&self) -> Stage {
        Stage::Processing
    }

    fn name(&self) -> &str {
        "processor_invoke"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        let Some(ResolvedProcessor(processor)) = ctx.attributes.get::<ResolvedProcessor>(RESOLVED_PROCESSOR_KEY) else {
            // Unreachable in practice: ROUTING short-circuits on a miss, so
            // PROCESSING never runs without a resolved processor. Declining
            // rather than panicking keeps this handler's contract total.
            return Err(TransactionError::unsupported_transaction_type());
        };
        let processor = processor.0.clone();
        let started_at = Instant::now();

        processor.validate(ctx).await?;
        processor.pre_process(ctx).await?;
        processor.do_process(ctx).await?;
        processor.post_process(ctx).await?;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if let Some(response) = ctx.response.as_mut() {
            response.processing_time_ms = elapsed_ms;
        } else {
            // A processor that declines via `Err` never reaches here (the
            // pipeline builds the decline response itself); a processor that
            // returns `Ok` without setting a response is a processor bug, not
            // a transaction decline, so this is a hard system error.
            return Err(TransactionError::new(
                fep_core::error::codes::SYSTEM_MALFUNCTION,
                "processor completed without producing a response",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fep_core::context::Cancellation;
    use fep_core::ids::{TerminalId, TransactionId};
    use fep_core::model::{Money, TransactionRequest, TransactionType};

    struct ApprovingProcessor;
    #[async_trait]
    impl Processor for ApprovingProcessor {
        async fn do_process(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
            ctx.response = Some(TransactionResponse::approve(
                ctx.request.transaction_id,
                ctx.request.rrn.clone(),
                ctx.request.stan.clone(),
                "123456",
            ));
            Ok(())
        }
    }

    struct BuggyProcessor;
    #[async_trait]
    impl Processor for BuggyProcessor {
        async fn do_process(&self, _ctx: &mut PipelineContext) -> Result<(), TransactionError> {
            Ok(())
        }
    }

    fn sample_request(transaction_type: TransactionType) -> TransactionRequest {
        TransactionRequest {
            transaction_id: TransactionId::new(),
            transaction_type,
            processing_code: "010000".into(),
            pan: "4111111111111111".into(),
            expiry: None,
            amount: Money::new(1_000, "TWD"),
            source_account: None,
            destination_account: None,
            terminal_id: TerminalId::new("ATM00001"),
            rrn: "123456789012".into(),
            stan: "000001".into(),
            pin_block: None,
            acquiring_bank_code: None,
            channel_name: "ATM1".into(),
            customer_id: None,
            original_transaction_id: None,
            extensions: Default::default(),
        }
    }

    #[tokio::test]
    async fn routing_handler_declines_unknown_transaction_type_as_57() {
        let registry = Arc::new(crate::registry::ProcessorRegistryBuilder::new().build());
        let handler = RoutingHandler { registry };
        let mut ctx = PipelineContext::new(sample_request(TransactionType::Withdrawal), Cancellation::new());
        let err = handler.handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.response_code, fep_core::error::codes::TRANSACTION_NOT_PERMITTED);
    }

    #[tokio::test]
    async fn routing_then_processing_produces_an_approved_response() {
        let registry = Arc::new(
            crate::registry::ProcessorRegistryBuilder::new()
                .register(TransactionType::Withdrawal, Arc::new(ApprovingProcessor))
                .build(),
        );
        let mut ctx = PipelineContext::new(sample_request(TransactionType::Withdrawal), Cancellation::new());
        RoutingHandler { registry }.handle(&mut ctx).await.unwrap();
        ProcessingHandler.handle(&mut ctx).await.unwrap();
        let response = ctx.response.expect("processor must have set a response");
        assert!(response.approved);
    }

    #[tokio::test]
    async fn processor_returning_ok_without_a_response_is_a_system_error() {
        let registry = Arc::new(
            crate::registry::ProcessorRegistryBuilder::new()
                .register(TransactionType::Transfer, Arc::new(BuggyProcessor))
                .build(),
        );
        let mut ctx = PipelineContext::new(sample_request(TransactionType::Transfer), Cancellation::new());
        RoutingHandler { registry }.handle(&mut ctx).await.unwrap();
        let err = ProcessingHandler.handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.response_code, fep_core::error::codes::SYSTEM_MALFUNCTION);
    }

}
