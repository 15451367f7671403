//! Wires the transport layer's `InboundHandler` seam (`fep-transport-tcp`) to
//! the real `Pipeline`, the same way `fep-scheduled`'s `TransactionSink` is
//! wired in `scheduled.rs` — both component crates stay decoupled from
//! `fep-pipeline`, and only this assembly crate knows the concrete type.
//!
//! Also closes the loop between `fep-timeout` and the pipeline's cooperative
//! cancellation (C5/§4.5): a transaction is tracked from the moment it
//! enters the pipeline until a response leaves it, and
//! [`CancellingTimeoutListener`] cancels the matching [`Cancellation`] if the
//! timeout manager decides it has overrun.
use std::sync::Arc;

use async_trait::async_trait;
use fep_core::codec::MessageCodec;
use fep_core::context::Cancellation;
use fep_core::ids::{ChannelId, TransactionId};
use fep_core::model::{TransactionRequest, TransactionResponse};
use fep_pipeline::{Pipeline, PipelineContext};
use fep_timeout::TimeoutManager;
use fep_transport_tcp::InboundHandler;
use tracing::warn;

use crate::codec::LineJsonCodec;
use crate::timeout_bridge::CancellingTimeoutListener;

pub struct PipelineInboundHandler {
    pipeline: Arc<Pipeline>,
    codec: LineJsonCodec,
    timeouts: Arc<TimeoutManager>,
    bridge: Arc<CancellingTimeoutListener>,
}

impl PipelineInboundHandler {
    pub fn new(pipeline: Arc<Pipeline>, timeouts: Arc<TimeoutManager>, bridge: Arc<CancellingTimeoutListener>) -> Self {
        Self { pipeline, codec: LineJsonCodec, timeouts, bridge }
    }
}

#[async_trait]
impl InboundHandler for PipelineInboundHandler {
    async fn handle(&self, channel_id: &ChannelId, frame: Vec<u8>) -> Option<Vec<u8>> {
        let mut request: TransactionRequest = match self.codec.decode(&frame) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, channel_id = %channel_id, "failed to decode inbound frame");
                return self.codec.encode(&decode_failure_response()).ok();
            }
        };
        request.channel_name = channel_id.clone();

        let transaction_id = request.transaction_id;
        let transaction_type = request.transaction_type.clone();
        let cancellation = Cancellation::new();
        self.bridge.register(transaction_id, cancellation.clone());
        if let Err(error) = self.timeouts.start_tracking(transaction_id, transaction_type, None) {
            warn!(%error, %transaction_id, "failed to start timeout tracking");
        }

        let ctx = PipelineContext::new(request, cancellation);
        let ctx = self.pipeline.execute(ctx).await;

        self.timeouts.complete_tracking(transaction_id);
        self.bridge.unregister(transaction_id);

        let response = ctx.response?;
        MessageCodec::<TransactionResponse>::encode(&self.codec, &response).ok()
    }
}

fn decode_failure_response() -> TransactionResponse {
    TransactionResponse::decline(
        TransactionId::new(),
        String::new(),
        String::new(),
        fep_core::error::codes::SYSTEM_MALFUNCTION,
        "inbound frame could not be decoded",
    )
}
