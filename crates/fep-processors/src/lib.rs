//! C8: the processor registry and router (`spec.md` §4.8). Domain processor
//! bodies (withdrawal, transfer, bill-payment, ...) are out of scope (§1) —
//! this crate only supplies the `Processor` capability trait, the
//! immutable-after-build registry, and the ROUTING/PROCESSING stage handlers
//! that dispatch to whatever is registered.
pub mod processor;
pub mod registry;
pub mod router;

pub use processor::Processor;
pub use registry::{ProcessorRegistry, ProcessorRegistryBuilder};
pub use router::{ProcessingHandler, RoutingHandler};
