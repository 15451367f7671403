//! C7: the transaction pipeline — a fixed five-stage cooperative chain
//! (DUPLICATE_CHECK → VALIDATION → ROUTING → PROCESSING → AUDIT) that
//! short-circuits on decline (P8) but always audits.
pub mod context;
pub mod handler;
pub mod listener;
pub mod pipeline;
pub mod stage;

pub use context::{Attributes, PipelineContext};
pub use handler::Handler;
pub use listener::PipelineListener;
pub use pipeline::Pipeline;
pub use stage::Stage;
