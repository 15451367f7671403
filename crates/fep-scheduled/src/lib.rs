//! C10: the scheduled-transfer engine (§4.10). Holds future-dated and
//! recurring transfers and re-injects them into the pipeline on their due
//! date through the [`sink::TransactionSink`] boundary, kept deliberately
//! free of a `fep-pipeline` dependency so `fep-hosting` owns the wiring.
pub mod engine;
pub mod error;
pub mod model;
pub mod sink;

pub use engine::{ScheduledTransferEngine, SCHEDULED_CHANNEL};
pub use error::ScheduleError;
pub use model::{Recurrence, ScheduleStatus, ScheduledTransfer};
pub use sink::TransactionSink;
