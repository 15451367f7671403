//! Wires `fep-scheduled`'s `TransactionSink` boundary to the real `Pipeline`
//! (mirrors `inbound.rs`'s wiring of `fep-transport-tcp`'s `InboundHandler`),
//! and spawns the daily sweep task named in §5's "scheduled-transfer daily
//! sweep" concern.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fep_core::context::Cancellation;
use fep_core::model::{TransactionRequest, TransactionResponse};
use fep_core::time::DateProvider;
use fep_pipeline::{Pipeline, PipelineContext};
use fep_scheduled::{ScheduledTransferEngine, TransactionSink};
use fep_timeout::TimeoutManager;
use tokio::task::JoinHandle;
use tracing::info;

use crate::timeout_bridge::CancellingTimeoutListener;

/// Interval between sweep checks. The sweep itself is idempotent per day (an
/// entry only advances once `scheduledDate <= date`), so polling more often
/// than once a day is harmless and catches a process restart near midnight.
const SWEEP_CHECK_INTERVAL: Duration = Duration::from_secs(3_600);

pub struct PipelineTransactionSink {
    pipeline: Arc<Pipeline>,
    timeouts: Arc<TimeoutManager>,
    bridge: Arc<CancellingTimeoutListener>,
}

impl PipelineTransactionSink {
    pub fn new(pipeline: Arc<Pipeline>, timeouts: Arc<TimeoutManager>, bridge: Arc<CancellingTimeoutListener>) -> Self {
        Self { pipeline, timeouts, bridge }
    }
}

#[async_trait]
impl TransactionSink for PipelineTransactionSink {
    async fn submit(&self, request: TransactionRequest) -> TransactionResponse {
        let transaction_id = request.transaction_id;
        let transaction_type = request.transaction_type.clone();
        let cancellation = Cancellation::new();
        self.bridge.register(transaction_id, cancellation.clone());
        if let Err(error) = self.timeouts.start_tracking(transaction_id, transaction_type, None) {
            tracing::warn!(%error, %transaction_id, "failed to start timeout tracking for scheduled transfer");
        }

        let ctx = PipelineContext::new(request, cancellation);
        let ctx = self.pipeline.execute(ctx).await;

        self.timeouts.complete_tracking(transaction_id);
        self.bridge.unregister(transaction_id);

        ctx.response.unwrap_or_else(|| {
            TransactionResponse::decline(
                fep_core::ids::TransactionId::new(),
                String::new(),
                String::new(),
                fep_core::error::codes::SYSTEM_MALFUNCTION,
                "scheduled transfer produced no response",
            )
        })
    }
}

/// Runs the daily sweep on an hourly ticker, re-checking `dates.today()` each
/// tick so a process that stays up across midnight picks up the new date
/// without a restart.
pub fn spawn_daily_sweep(engine: Arc<ScheduledTransferEngine>, dates: Arc<dyn DateProvider>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_CHECK_INTERVAL);
        let mut last_swept = None;
        loop {
            ticker.tick().await;
            let today = dates.today();
            if last_swept == Some(today) {
                continue;
            }
            let injected = engine.execute_scheduled_transfers(today).await;
            info!(date = %today, injected, "scheduled-transfer sweep completed");
            last_swept = Some(today);
        }
    })
}
