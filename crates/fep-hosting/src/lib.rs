//! Process assembly, operator CLI support, and the in-memory repository for
//! the Financial Exchange Processor. Every other crate in this workspace is
//! deliberately decoupled from its neighbors (trait boundaries only); this
//! one is where the concrete wiring happens, for exactly one binary
//! (`fep-server`, in `main.rs`) to consume.
#![deny(unsafe_code)]

mod assembly;
mod codec;
mod demo_processor;
mod handlers;
mod inbound;
mod repository;
mod scheduled;
mod timeout_bridge;

pub use assembly::Assembly;
pub use codec::LineJsonCodec;
pub use demo_processor::DemoProcessor;
pub use handlers::{AuditHandler, DuplicateCheckHandler};
pub use inbound::PipelineInboundHandler;
pub use repository::InMemoryRepository;
pub use scheduled::{spawn_daily_sweep, PipelineTransactionSink};
pub use timeout_bridge::CancellingTimeoutListener;
