//! The pipeline controller itself: a table of handlers-per-stage and
//! listeners, swapped in as one immutable snapshot so registration never
//! interleaves with an in-flight request (§4.7: "handlers and listeners may
//! be added/removed atomically between requests only").
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use fep_core::error::codes;
use fep_core::model::TransactionResponse;
use tracing::debug;

use crate::context::PipelineContext;
use crate::handler::Handler;
use crate::listener::PipelineListener;
use crate::stage::Stage;

#[derive(Clone, Default)]
struct PipelineTable {
    duplicate_check: Vec<Arc<dyn Handler>>,
    validation: Vec<Arc<dyn Handler>>,
    routing: Vec<Arc<dyn Handler>>,
    processing: Vec<Arc<dyn Handler>>,
    audit: Vec<Arc<dyn Handler>>,
    listeners: Vec<Arc<dyn PipelineListener>>,
}

impl PipelineTable {
    fn handlers_mut(&mut self, stage: Stage) -> &mut Vec<Arc<dyn Handler>> {
        match stage {
            Stage::DuplicateCheck => &mut self.duplicate_check,
            Stage::Validation => &mut self.validation,
            Stage::Routing => &mut self.routing,
            Stage::Processing => &mut self.processing,
            Stage::Audit => &mut self.audit,
        }
    }

    fn handlers(&self, stage: Stage) -> &[Arc<dyn Handler>] {
        match stage {
            Stage::DuplicateCheck => &self.duplicate_check,
            Stage::Validation => &self.validation,
            Stage::Routing => &self.routing,
            Stage::Processing => &self.processing,
            Stage::Audit => &self.audit,
        }
    }
}

pub struct Pipeline {
    table: ArcSwap<PipelineTable>,
}

impl Pipeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            table: ArcSwap::from_pointee(PipelineTable::default()),
        })
    }

    /// Inserts `handler` into its declared stage, re-sorting that stage by
    /// ascending `order()`, and publishes the result as a new snapshot.
    pub fn register_handler(&self, handler: Arc<dyn Handler>) {
        self.table.rcu(|current| {
            let mut next = (**current).clone();
            let stage = handler.stage();
            let bucket = next.handlers_mut(stage);
            bucket.push(handler.clone());
            bucket.sort_by_key(|h| h.order());
            Arc::new(next)
        });
    }

    pub fn register_listener(&self, listener: Arc<dyn PipelineListener>) {
        self.table.rcu(|current| {
            let mut next = (**current).clone();
            next.listeners.push(listener.clone());
            Arc::new(next)
        });
    }

    /// Removes every handler named `name` from `stage`. No-op if absent.
    pub fn remove_handler(&self, stage: Stage, name: &str) {
        self.table.rcu(|current| {
            let mut next = (**current).clone();
            next.handlers_mut(stage).retain(|h| h.name() != name);
            Arc::new(next)
        });
    }

    /// Runs `ctx` through DUPLICATE_CHECK → VALIDATION → ROUTING →
    /// PROCESSING, short-circuiting on `continue_chain == false` or a
    /// handler's `Err` (P8), then always runs AUDIT.
    pub async fn execute(&self, mut ctx: PipelineContext) -> PipelineContext {
        let table = self.table.load_full();

        for listener in &table.listeners {
            listener.on_start(&ctx);
        }

        for stage in Stage::ORDER {
            if stage == Stage::Audit {
                break;
            }
            if ctx.cancellation.is_cancelled() {
                ctx.response = Some(TransactionResponse::decline(
                    ctx.request.transaction_id,
                    ctx.request.rrn.clone(),
                    ctx.request.stan.clone(),
                    codes::REQUEST_TIMEOUT,
                    "transaction cancelled by timeout manager",
                ));
                ctx.continue_chain = false;
                break;
            }
            if !self.run_stage(&table, stage, &mut ctx).await {
                break;
            }
        }

        // AUDIT always runs, even on the short-circuit path.
        let _ = self.run_stage(&table, Stage::Audit, &mut ctx).await;

        for listener in &table.listeners {
            listener.on_complete(&ctx);
        }
        ctx
    }

    /// Runs every handler in `stage` in order. Returns `false` if the chain
    /// should stop after this stage (either a handler cleared
    /// `continue_chain`, or one declined with a `TransactionError`).
    async fn run_stage(&self, table: &PipelineTable, stage: Stage, ctx: &mut PipelineContext) -> bool {
        for listener in &table.listeners {
            listener.on_stage_enter(stage, ctx);
        }
        let started_at = Instant::now();

        let mut keep_going = true;
        for handler in table.handlers(stage) {
            if ctx.cancellation.is_cancelled() && stage != Stage::Audit {
                keep_going = false;
                break;
            }
            debug!(stage = %stage, handler = handler.name(), "pipeline handler running");
            match handler.handle(ctx).await {
                Ok(()) => {
                    if !ctx.continue_chain {
                        keep_going = false;
                        break;
                    }
                }
                Err(error) => {
                    ctx.response = Some(TransactionResponse::decline(
                        ctx.request.transaction_id,
                        ctx.request.rrn.clone(),
                        ctx.request.stan.clone(),
                        error.response_code,
                        error.reason.clone(),
                    ));
                    ctx.continue_chain = false;
                    for listener in &table.listeners {
                        listener.on_error(stage, &error, ctx);
                    }
                    keep_going = false;
                    break;
                }
            }
        }

        ctx.record_stage_timing(stage, started_at);
        for listener in &table.listeners {
            listener.on_stage_exit(stage, ctx);
        }
        keep_going
    }
}
