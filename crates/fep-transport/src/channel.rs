//! The byte-stream channel contract C2/C3 are built against.
use async_trait::async_trait;
use bytes::{Buf, BufMut};
use fep_core::error::FepError;

use crate::addr::TransportSocketAddr;

/// Coarse readiness of a [`Channel`], independent of the richer
/// `ConnectionState`/`ServerState` machines in `fep-core::model` — those
/// drive the client/server; this is what the channel itself reports about
/// its socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    /// Not yet connected/bound.
    NotReady,
    /// Usable for read/write.
    Ready,
    /// Closed locally or by the peer; no further I/O will succeed.
    Closed,
}

/// The result of a sign-on / handshake exchange performed immediately after
/// a channel reaches [`ReadyState::Ready`] (§4.2: "an explicit sign-on
/// exchange drives to SIGNING_ON -> SIGNED_ON").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Accepted,
    Rejected,
}

/// A single bidirectional, framed byte-stream connection.
///
/// # Why
/// `fep-transport-tcp`'s `TcpClient`/`TcpServer` are built around this trait
/// rather than `tokio::net::TcpStream` directly so that the state machine,
/// heartbeat, and reconnect logic can be exercised against an in-memory
/// double without a real socket.
///
/// # Contract
/// - `read`/`write` behave like their `tokio::io` counterparts: `Ok(0)` from
///   `read` means the peer has closed its write half.
/// - `shutdown` is idempotent; calling it twice is not an error.
/// - `ready_state` is a lock-free snapshot; implementations must not block.
#[async_trait]
pub trait Channel: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    fn peer_addr(&self) -> Option<TransportSocketAddr>;

    fn local_addr(&self) -> Option<TransportSocketAddr>;

    async fn read_into(&self, buf: &mut (dyn BufMut + Send)) -> Result<usize, FepError>;

    async fn write_all(&self, buf: &mut (dyn Buf + Send)) -> Result<(), FepError>;

    async fn shutdown(&self) -> Result<(), FepError>;
}
