//! `PipelineContext` — the per-request scratchpad threaded through every
//! handler by `&mut` reference (§3). One owned struct, no `Send`-boxed
//! futures per handler: handlers within a single request run cooperatively
//! on one worker, so there is nothing to hand off between them.
use std::any::Any;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use fep_core::context::Cancellation;
use fep_core::model::TransactionRequest;
use fep_core::model::TransactionResponse;

use crate::stage::Stage;

/// A small type-keyed scratch map, for handlers that need to pass data to
/// later stages without threading dedicated fields through this struct for
/// every such need (e.g. ROUTING recording the resolved processor for
/// PROCESSING to pick up — §4.8).
#[derive(Default)]
pub struct Attributes(HashMap<String, Box<dyn Any + Send + Sync>>);

impl Attributes {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.0.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.0.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }
}

pub struct PipelineContext {
    pub request: TransactionRequest,
    pub response: Option<TransactionResponse>,
    pub continue_chain: bool,
    pub attributes: Attributes,
    pub cancellation: Cancellation,
    stage_timings: Vec<(Stage, Duration)>,
}

impl PipelineContext {
    pub fn new(request: TransactionRequest, cancellation: Cancellation) -> Self {
        Self {
            request,
            response: None,
            continue_chain: true,
            attributes: Attributes::default(),
            cancellation,
            stage_timings: Vec::with_capacity(Stage::ORDER.len()),
        }
    }

    pub fn record_stage_timing(&mut self, stage: Stage, started_at: Instant) {
        self.stage_timings.push((stage, started_at.elapsed()));
    }

    pub fn stage_timings(&self) -> &[(Stage, Duration)] {
        &self.stage_timings
    }
}
