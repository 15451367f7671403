//! End-to-end scenarios exercising real instances of every pipeline-facing
//! component together: limits, dedup, routing, audit, timeouts, scheduled
//! transfers, and the transport layer's reconnect path. These are
//! deliberately not unit tests of one handler in isolation (each component
//! crate already has those) — they assemble the same handler chain
//! `Assembly::build` wires and drive requests through it the way a real
//! inbound frame would.
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fep_core::context::Cancellation;
use fep_core::error::codes;
use fep_core::ids::{CustomerId, TerminalId, TransactionId};
use fep_core::model::{ConnectionProfile, ConnectionState, Money, TransactionRequest, TransactionResponse, TransactionType};
use fep_core::repository::TransactionRepository;
use fep_core::time::{SystemClock, SystemDateProvider};
use fep_dedup::DuplicateChecker;
use fep_limits::{AmountRule, AmountValidator, CardValidator, LimitCheckHandler, LimitManager, LimitRule, PinBlockValidator, TerminalIdValidator};
use fep_pipeline::{Pipeline, PipelineContext};
use fep_processors::{ProcessingHandler, ProcessorRegistryBuilder, RoutingHandler};
use fep_scheduled::{Recurrence, ScheduleStatus, ScheduledTransferEngine, TransactionSink};
use fep_timeout::{TimeoutContext, TimeoutListener, TimeoutStatus};
use fep_transport_tcp::{DualChannelClient, DualChannelServer, InboundHandler};
use fep_hosting::{AuditHandler, CancellingTimeoutListener, DemoProcessor, DuplicateCheckHandler, InMemoryRepository};

fn sample_request(rrn: &str, stan: &str, amount_minor_units: i64, customer_id: Option<CustomerId>) -> TransactionRequest {
    TransactionRequest {
        transaction_id: TransactionId::new(),
        transaction_type: TransactionType::Withdrawal,
        processing_code: "010000".into(),
        pan: "4111111111111111".into(),
        expiry: Some("2912".into()),
        amount: Money::new(amount_minor_units, "TWD"),
        source_account: Some("ACC1".into()),
        destination_account: None,
        terminal_id: TerminalId::new("ATM00001"),
        rrn: rrn.into(),
        stan: stan.into(),
        pin_block: Some("ABCDEF1234567890".into()),
        acquiring_bank_code: None,
        channel_name: "ATM_NCR_V1".into(),
        customer_id,
        original_transaction_id: None,
        extensions: Default::default(),
    }
}

/// Builds the same DuplicateCheck -> Validation -> Routing -> Processing ->
/// Audit chain `fep_hosting::Assembly::build` wires, but returns the
/// individual pieces so a test can poke at the repository/limit manager
/// afterward.
struct Harness {
    pipeline: Arc<Pipeline>,
    limits: Arc<LimitManager>,
    repository: Arc<InMemoryRepository>,
}

fn build_harness() -> Harness {
    let pipeline = Pipeline::new();
    let dedup = Arc::new(DuplicateChecker::new(Arc::new(SystemClock), Duration::from_secs(60), NonZeroUsize::new(64).unwrap()));
    let limits = Arc::new(LimitManager::new(Arc::new(SystemDateProvider)));
    limits.set_rule(
        TransactionType::Withdrawal,
        LimitRule { single_max_minor_units: Some(500_000), daily_max_minor_units: Some(800_000), monthly_max_minor_units: None },
    );
    let repository = Arc::new(InMemoryRepository::new());
    let processors = Arc::new(ProcessorRegistryBuilder::new().register(TransactionType::Withdrawal, Arc::new(DemoProcessor)).build());

    pipeline.register_handler(Arc::new(DuplicateCheckHandler { checker: dedup }));
    pipeline.register_handler(Arc::new(CardValidator::new(true)));
    pipeline.register_handler(Arc::new(AmountValidator::new(AmountRule::default())));
    pipeline.register_handler(Arc::new(PinBlockValidator::with_defaults()));
    pipeline.register_handler(Arc::new(TerminalIdValidator));
    pipeline.register_handler(Arc::new(LimitCheckHandler { manager: limits.clone() }));
    pipeline.register_handler(Arc::new(RoutingHandler { registry: processors }));
    pipeline.register_handler(Arc::new(ProcessingHandler));
    pipeline.register_handler(Arc::new(AuditHandler { repository: (repository.clone() as Arc<dyn TransactionRepository>), limits: limits.clone() }));

    Harness { pipeline, limits, repository }
}

#[tokio::test]
async fn scenario_1_basic_withdrawal_is_approved_and_audited() {
    let harness = build_harness();
    let request = sample_request("RRN000001", "000001", 10_000, None);
    let transaction_id = request.transaction_id;

    let ctx = PipelineContext::new(request, Cancellation::new());
    let ctx = harness.pipeline.execute(ctx).await;

    let response = ctx.response.expect("pipeline must produce a response");
    assert!(response.approved);
    assert_eq!(response.response_code, codes::APPROVED);

    let record = harness.repository.find_by_id(transaction_id).await.unwrap().expect("audit must persist the outcome");
    assert_eq!(record.response.response_code, codes::APPROVED);
}

#[tokio::test]
async fn scenario_2_duplicate_retry_is_rejected() {
    let harness = build_harness();
    let first = sample_request("RRN000002", "000002", 10_000, None);
    let retry = sample_request("RRN000002", "000002", 10_000, None);

    let ctx = PipelineContext::new(first, Cancellation::new());
    let ctx = harness.pipeline.execute(ctx).await;
    assert!(ctx.response.unwrap().approved);

    let ctx = PipelineContext::new(retry, Cancellation::new());
    let ctx = harness.pipeline.execute(ctx).await;
    let response = ctx.response.expect("a decline is still a response");
    assert!(!response.approved);
    assert_eq!(response.response_code, codes::DUPLICATE_TRANSACTION);
}

#[tokio::test]
async fn scenario_3_withdrawal_exceeding_daily_limit_is_declined() {
    let harness = build_harness();
    let customer = CustomerId::new("CUST1");

    // First withdrawal: within both the single and daily ceilings.
    let first = sample_request("RRN100001", "100001", 400_000, Some(customer.clone()));
    let ctx = harness.pipeline.execute(PipelineContext::new(first, Cancellation::new())).await;
    assert!(ctx.response.unwrap().approved);

    // Second withdrawal: well under the single-transaction ceiling (500_000)
    // but pushes the day's cumulative total (400_000 + 400_000) past the
    // 800_000 daily ceiling.
    let second = sample_request("RRN100002", "100002", 400_000, Some(customer));
    let ctx = harness.pipeline.execute(PipelineContext::new(second, Cancellation::new())).await;
    let response = ctx.response.expect("a decline is still a response");
    assert!(!response.approved);
    assert_eq!(response.response_code, codes::EXCEEDS_WITHDRAWAL_LIMIT);
}

#[tokio::test]
async fn scenario_4_client_reconnects_after_the_connection_is_closed() {
    struct NoopHandler;
    #[async_trait::async_trait]
    impl InboundHandler for NoopHandler {
        async fn handle(&self, _channel_id: &fep_core::ids::ChannelId, _frame: Vec<u8>) -> Option<Vec<u8>> {
            None
        }
    }

    fn profile(server_mode: bool, port: u16) -> ConnectionProfile {
        ConnectionProfile {
            profile_id: "RECONNECT_TEST".into(),
            host: "127.0.0.1".into(),
            send_port: port,
            receive_port: None,
            connect_timeout_ms: 500,
            response_timeout_ms: 500,
            heartbeat_interval_ms: 60_000,
            keepalive_interval_ms: 30_000,
            retry_delay_ms: 10,
            max_retries: 3,
            tls: false,
            pool_size: 1,
            auto_reconnect: true,
            server_mode,
            send_queue_capacity: 1024,
            properties: Default::default(),
        }
    }

    let server = DualChannelServer::new(fep_core::ids::ChannelId::new("SRV1"), profile(true, 0), Arc::new(NoopHandler));
    server.start().await.unwrap();
    let port = server.actual_send_port().await.unwrap();

    let client = DualChannelClient::new(fep_core::ids::ChannelId::new("ATM1"), profile(false, port));
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    // Simulate the manager having detected a dropped peer (§4.4's
    // "reconnect" operator action): the connection is torn down...
    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // ...and brought back up without the operator re-resolving the binding.
    client.reconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn scenario_5_monthly_scheduled_transfer_advances_and_eventually_completes() {
    struct RecordingSink {
        calls: std::sync::atomic::AtomicUsize,
    }
    #[async_trait::async_trait]
    impl TransactionSink for RecordingSink {
        async fn submit(&self, request: TransactionRequest) -> TransactionResponse {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            TransactionResponse::approve(request.transaction_id, request.rrn, request.stan, "000000")
        }
    }

    let sink = Arc::new(RecordingSink { calls: std::sync::atomic::AtomicUsize::new(0) });
    let engine = Arc::new(ScheduledTransferEngine::new(sink.clone(), 1_000_000));

    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
    let end_date = chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let schedule_id = engine
        .create_scheduled_transfer(
            today,
            CustomerId::new("CUST2"),
            "ACC1",
            "ACC2",
            Money::new(50_000, "TWD"),
            Recurrence::Monthly,
            today,
            Some(end_date),
        )
        .unwrap();

    let injected = engine.execute_scheduled_transfers(today).await;
    assert_eq!(injected, 1);
    assert_eq!(sink.calls.load(std::sync::atomic::Ordering::Relaxed), 1);

    // Jan 31 + 1 month clamps to the last day of February.
    let entry = engine.get(&schedule_id).unwrap();
    assert_eq!(entry.status, ScheduleStatus::Active);
    assert_eq!(entry.scheduled_date, chrono::NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());

    let injected = engine.execute_scheduled_transfers(entry.scheduled_date).await;
    assert_eq!(injected, 1);
    let entry = engine.get(&schedule_id).unwrap();
    // Feb 28 + 1 month = Mar 28, which is past the Mar 1 end date.
    assert_eq!(entry.status, ScheduleStatus::Completed);
    assert_eq!(sink.calls.load(std::sync::atomic::Ordering::Relaxed), 2);
}

#[tokio::test]
async fn scenario_6_timeout_manager_cancels_an_in_flight_transaction() {
    let harness = build_harness();
    let bridge = Arc::new(CancellingTimeoutListener::new());

    let request = sample_request("RRN900001", "900001", 10_000, None);
    let transaction_id = request.transaction_id;
    let cancellation = Cancellation::new();
    bridge.register(transaction_id, cancellation.clone());

    // Simulate the timeout manager's monitor tick deciding this transaction
    // has overrun, without waiting on a real timer.
    bridge.on_timeout(&TimeoutContext {
        transaction_id,
        transaction_type: TransactionType::Withdrawal,
        start: Instant::now(),
        timeout_ms: 10_000,
        status: TimeoutStatus::Expired,
    });
    assert!(cancellation.is_cancelled());

    let ctx = PipelineContext::new(request, cancellation);
    let ctx = harness.pipeline.execute(ctx).await;

    let response = ctx.response.expect("a cancelled transaction still gets a response");
    assert!(!response.approved);
    assert_eq!(response.response_code, codes::REQUEST_TIMEOUT);

    // AUDIT still runs on the cancellation short-circuit path (§4.7: "AUDIT
    // always runs"), so the timeout is on record.
    let record = harness.repository.find_by_id(transaction_id).await.unwrap().expect("AUDIT must run even on a timeout decline");
    assert_eq!(record.response.response_code, codes::REQUEST_TIMEOUT);
}
