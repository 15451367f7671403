//! Concrete Tokio implementation of C2 (dual-channel client) and C3
//! (dual-channel server) from `spec.md` §4.2/§4.3, built against the
//! transport-agnostic contracts in `fep-transport`.
//!
//! Framing is a minimal 4-byte length prefix ([`tcp_channel`]); the bit-level
//! wire codec remains out of scope and is supplied by callers through
//! `fep_core::codec::MessageCodec` one layer up (in `fep-manager`).
pub mod client;
pub mod pending;
pub mod server;
pub mod tcp_channel;

pub use client::DualChannelClient;
pub use pending::{PendingMap, PendingOutcome};
pub use server::{DualChannelServer, InboundHandler};
pub use tcp_channel::TcpSocketChannel;
