//! Wires every component crate into one runnable process (§6's "process
//! assembly" concern). This is the one place in the workspace allowed to
//! know every concrete type — `fep-registry`, `fep-manager`,
//! `fep-transport-tcp`, `fep-pipeline`, `fep-limits`, `fep-dedup`,
//! `fep-timeout`, `fep-processors`, and `fep-scheduled` otherwise only ever
//! see each other through trait objects.
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fep_core::error::FepError;
use fep_core::model::TransactionType;
use fep_core::repository::TransactionRepository;
use fep_core::time::{Clock, DateProvider, SystemClock, SystemDateProvider};
use fep_dedup::DuplicateChecker;
use fep_limits::{AmountRule, AmountValidator, CardValidator, LimitCheckHandler, LimitManager, PinBlockValidator, TerminalIdValidator};
use fep_manager::{ConnectionManager, ReconcileOnUpdate};
use fep_pipeline::Pipeline;
use fep_processors::{ProcessingHandler, ProcessorRegistry, ProcessorRegistryBuilder, RoutingHandler};
use fep_registry::{ConfigSource, Registry, StrictMode, SubscriptionHandle, DEFAULT_POLL_INTERVAL};
use fep_scheduled::ScheduledTransferEngine;
use fep_timeout::TimeoutManager;
use fep_transport_tcp::InboundHandler;
use tokio::task::JoinHandle;

use crate::demo_processor::DemoProcessor;
use crate::handlers::{AuditHandler, DuplicateCheckHandler};
use crate::inbound::PipelineInboundHandler;
use crate::repository::InMemoryRepository;
use crate::scheduled::{spawn_daily_sweep, PipelineTransactionSink};
use crate::timeout_bridge::CancellingTimeoutListener;

/// Per-customer/per-type limit ceilings installed at assembly time. A real
/// deployment would load these from the same configuration document as the
/// channel/profile registry; hard-coding a conservative default here keeps
/// the assembled system usable out of the box (mirrors `DemoProcessor`'s
/// role for the processor registry).
const DEFAULT_SINGLE_MAX_MINOR_UNITS: i64 = 2_000_000;
const DEFAULT_DAILY_MAX_MINOR_UNITS: i64 = 5_000_000;

/// Every long-lived piece of the assembled system, built once at process
/// start and held for the process's lifetime.
pub struct Assembly {
    pub registry: Arc<Registry>,
    pub manager: Arc<ConnectionManager>,
    pub pipeline: Arc<Pipeline>,
    pub timeouts: Arc<TimeoutManager>,
    pub limits: Arc<LimitManager>,
    pub dedup: Arc<DuplicateChecker>,
    pub repository: Arc<dyn TransactionRepository>,
    pub processors: Arc<ProcessorRegistry>,
    pub scheduled: Arc<ScheduledTransferEngine>,
    monitor_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
    hot_reload_task: Option<JoinHandle<()>>,
    // Kept alive for the process's lifetime so the registry keeps notifying
    // `ConnectionManager::reconcile` on every load/register/unregister.
    // Dropping this handle would NOT end the subscription on its own (it
    // must be consumed by `SubscriptionHandle::unsubscribe` to do that) —
    // it is held here purely so the field, not a bare `_`, documents why.
    _reconcile_subscription: SubscriptionHandle,
}

impl Assembly {
    /// Builds every component and registers the full VALIDATION ->
    /// ... -> AUDIT handler chain, but does not yet load any channel/profile
    /// configuration — call [`Self::load_and_watch`] (or `registry.load`
    /// directly) once a [`ConfigSource`] is available.
    pub fn build(strict: StrictMode) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dates: Arc<dyn DateProvider> = Arc::new(SystemDateProvider);

        let registry = Registry::new(strict);
        let pipeline = Pipeline::new();

        let bridge = Arc::new(CancellingTimeoutListener::new());
        let timeouts = TimeoutManager::new(clock, bridge.clone());
        let monitor_task = timeouts.spawn_monitor();

        let retention = DuplicateChecker::retention_from_timeout_defaults(default_timeout_defaults());
        let dedup = Arc::new(DuplicateChecker::new(Arc::new(SystemClock), retention, NonZeroUsize::new(fep_dedup::DEFAULT_CAPACITY).unwrap()));

        let limits = Arc::new(LimitManager::new(dates.clone()));
        for transaction_type in [TransactionType::Withdrawal, TransactionType::Transfer, TransactionType::BillPayment] {
            limits.set_rule(
                transaction_type,
                fep_limits::LimitRule {
                    single_max_minor_units: Some(DEFAULT_SINGLE_MAX_MINOR_UNITS),
                    daily_max_minor_units: Some(DEFAULT_DAILY_MAX_MINOR_UNITS),
                    monthly_max_minor_units: None,
                },
            );
        }

        let processors = Arc::new(
            ProcessorRegistryBuilder::new()
                .register(TransactionType::Withdrawal, Arc::new(DemoProcessor))
                .register(TransactionType::Transfer, Arc::new(DemoProcessor))
                .register(TransactionType::BillPayment, Arc::new(DemoProcessor))
                .register(TransactionType::BalanceInquiry, Arc::new(DemoProcessor))
                .register(TransactionType::FundsInquiry, Arc::new(DemoProcessor))
                .register(TransactionType::Reversal, Arc::new(DemoProcessor))
                .register(TransactionType::ScheduledTransfer, Arc::new(DemoProcessor))
                .build(),
        );

        let repository: Arc<dyn TransactionRepository> = Arc::new(InMemoryRepository::new());

        pipeline.register_handler(Arc::new(DuplicateCheckHandler { checker: dedup.clone() }));
        pipeline.register_handler(Arc::new(CardValidator::new(true)));
        pipeline.register_handler(Arc::new(AmountValidator::new(AmountRule::default())));
        pipeline.register_handler(Arc::new(PinBlockValidator::with_defaults()));
        pipeline.register_handler(Arc::new(TerminalIdValidator));
        pipeline.register_handler(Arc::new(LimitCheckHandler { manager: limits.clone() }));
        pipeline.register_handler(Arc::new(RoutingHandler { registry: processors.clone() }));
        pipeline.register_handler(Arc::new(ProcessingHandler));
        pipeline.register_handler(Arc::new(AuditHandler { repository: repository.clone(), limits: limits.clone() }));

        let inbound_handler: Arc<dyn InboundHandler> =
            Arc::new(PipelineInboundHandler::new(pipeline.clone(), timeouts.clone(), bridge.clone()));
        let manager = ConnectionManager::new(registry.clone(), inbound_handler);

        let subscription = registry.subscribe(Arc::new(ReconcileOnUpdate(manager.clone())));

        let sink: Arc<dyn fep_scheduled::TransactionSink> =
            Arc::new(PipelineTransactionSink::new(pipeline.clone(), timeouts.clone(), bridge));
        let scheduled = Arc::new(ScheduledTransferEngine::new(sink, DEFAULT_SINGLE_MAX_MINOR_UNITS));
        let sweep_task = spawn_daily_sweep(scheduled.clone(), dates);

        Self {
            registry,
            manager,
            pipeline,
            timeouts,
            limits,
            dedup,
            repository,
            processors,
            scheduled,
            monitor_task,
            sweep_task,
            hot_reload_task: None,
            _reconcile_subscription: subscription,
        }
    }

    /// Loads `source` into the registry once, then spawns the hot-reload
    /// poller (§4.1, default 5s) to keep picking up later edits. Replaces
    /// any previously-spawned poller — calling this twice aborts the first.
    pub fn load_and_watch(&mut self, source: Arc<dyn ConfigSource>, interval: Duration) -> Result<(), FepError> {
        self.registry.load(source.as_ref())?;
        if let Some(previous) = self.hot_reload_task.take() {
            previous.abort();
        }
        self.hot_reload_task = Some(fep_registry::spawn_hot_reload(self.registry.clone(), source, interval));
        Ok(())
    }

    /// Same as [`Self::load_and_watch`] with the default poll interval
    /// (§4.1: 5s).
    pub fn load_and_watch_default(&mut self, source: Arc<dyn ConfigSource>) -> Result<(), FepError> {
        self.load_and_watch(source, DEFAULT_POLL_INTERVAL)
    }

    /// Stops background tasks and clears in-flight timeout tracking. Does
    /// not close individual connections — callers that want a clean
    /// disconnect should walk `manager.client_ids()`/`server_ids()` and call
    /// `remove_connection` first.
    pub async fn shutdown(&self) {
        if let Some(task) = &self.hot_reload_task {
            task.abort();
        }
        self.sweep_task.abort();
        self.monitor_task.abort();
        self.timeouts.shutdown();
    }
}

fn default_timeout_defaults() -> Vec<u64> {
    // Mirrors `TimeoutManager::new`'s own seed values (§4.5) so the
    // duplicate-check retention window (§9's resolved open question) always
    // tracks whatever the timeout manager actually enforces, without this
    // module reaching into `TimeoutManager`'s private defaults map.
    vec![5_000, 5_000, 10_000, 15_000, 30_000]
}
