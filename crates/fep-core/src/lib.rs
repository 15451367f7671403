//! `fep-core`: the shared kernel every other crate in this workspace depends
//! on — stable errors, call context, a clock abstraction, an observability
//! façade, the configuration-document shapes, the §3 data model, and the
//! persistence/codec trait boundaries.
//!
//! Nothing in this crate performs network I/O or holds process-lifetime
//! state; it is pure types and trait contracts, consumed by the component
//! crates (`fep-registry`, `fep-transport-tcp`, `fep-pipeline`, ...).

pub mod codec;
pub mod configuration;
pub mod context;
pub mod error;
pub mod ids;
pub mod model;
pub mod observability;
pub mod repository;
pub mod time;

pub mod prelude {
    pub use crate::context::{CallContext, Cancellation, Deadline};
    pub use crate::error::{ErrorCategory, FepError, TransactionError};
    pub use crate::ids::{ChannelId, CorrelationKey, CustomerId, ProfileId, ScheduleId, TerminalId, TransactionId};
    pub use crate::model::{
        Channel, ChannelConnection, ChannelType, ConnectionProfile, ConnectionState, Extensions,
        Money, ServerState, TransactionRequest, TransactionResponse, TransactionType,
    };
    pub use crate::time::{Clock, DateProvider, SystemClock, SystemDateProvider};
}
