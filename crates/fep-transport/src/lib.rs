//! Transport-agnostic contracts for the dual-channel client/server
//! (`fep-transport-tcp` and, eventually, any sibling transport).
//!
//! # Why
//! C2 and C3 both need a "channel" abstraction independent of the concrete
//! socket type so that tests can swap in an in-memory channel without the
//! state machine, heartbeat, and reconnect logic caring. This crate carries
//! exactly that seam: a byte-stream [`Channel`] trait, an address type, and
//! the backpressure/ready-state vocabulary the client/server state machines
//! speak in. It holds no I/O and no process-lifetime state.
//!
//! # How
//! Trimmed down from this codebase's usual `no_std + alloc` transport-layer
//! generality (budgets, rate limiters, datagram endpoints) to the one shape
//! the dual-channel client/server actually needs: a framed, bidirectional,
//! async byte stream over Tokio. A single-process financial processor has no
//! use for swapping in embedded/no_std transports, so this crate is plain
//! `std` and depends directly on `tokio` and `fep-core`.

pub mod addr;
pub mod backpressure;
pub mod channel;

pub use addr::TransportSocketAddr;
pub use backpressure::BackpressureDecision;
pub use channel::{Channel, HandshakeOutcome, ReadyState};
