//! The concrete, Tokio-backed [`fep_transport::Channel`] implementation and
//! the length-prefixed frame reader/writer the client/server loops read
//! discrete messages off. Framing is deliberately the simplest thing that
//! works (§1: the bit-level codec itself is out of scope) — a 4-byte
//! big-endian length prefix followed by the payload bytes the
//! `fep_core::codec::MessageCodec` encodes/decodes.
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use fep_core::error::FepError;
use fep_transport::{Channel, HandshakeOutcome, ReadyState, TransportSocketAddr};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

/// The maximum single-frame payload this transport accepts. Generous enough
/// for any ISO-8583-shaped message; exists purely to reject a corrupt length
/// prefix instead of attempting an unbounded allocation.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

fn ready_state_from_u8(value: u8) -> ReadyState {
    match value {
        1 => ReadyState::Ready,
        2 => ReadyState::Closed,
        _ => ReadyState::NotReady,
    }
}

fn ready_state_to_u8(state: ReadyState) -> u8 {
    match state {
        ReadyState::NotReady => 0,
        ReadyState::Ready => 1,
        ReadyState::Closed => 2,
    }
}

/// A single TCP socket wrapped to satisfy [`fep_transport::Channel`]. Reads
/// and writes are each serialized behind their own async mutex so a
/// `TcpSocketChannel` can be shared (`Arc`) between the send loop/caller and
/// the receive loop without the two halves fighting over one lock.
pub struct TcpSocketChannel {
    stream: AsyncMutex<TcpStream>,
    peer_addr: Option<TransportSocketAddr>,
    local_addr: Option<TransportSocketAddr>,
    state: AtomicU8,
}

impl TcpSocketChannel {
    pub async fn connect(host: &str, port: u16) -> Result<Self, FepError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| FepError::not_connected(format!("connect {host}:{port}: {e}")))?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok().map(Into::into);
        let local_addr = stream.local_addr().ok().map(Into::into);
        let _ = stream.set_nodelay(true);
        Self {
            stream: AsyncMutex::new(stream),
            peer_addr,
            local_addr,
            state: AtomicU8::new(ready_state_to_u8(ReadyState::Ready)),
        }
    }

    /// Applies the profile's keepalive interval to the underlying socket,
    /// distinct from the application-level heartbeat exchange the client
    /// drives on top of it.
    pub async fn configure_keepalive(&self, interval_ms: u64) -> Result<(), FepError> {
        let guard = self.stream.lock().await;
        let sock_ref = SockRef::from(&*guard);
        let keepalive = TcpKeepalive::new().with_time(std::time::Duration::from_millis(interval_ms));
        sock_ref
            .set_tcp_keepalive(&keepalive)
            .map_err(|e| FepError::not_connected(format!("set keepalive: {e}")))
    }

    /// Reads one length-prefixed frame; `Ok(None)` means the peer closed its
    /// write half cleanly (read returned 0 at a frame boundary).
    pub async fn read_frame(&self) -> Result<Option<Bytes>, FepError> {
        let mut stream = self.stream.lock().await;
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.state.store(ready_state_to_u8(ReadyState::Closed), Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => {
                self.state.store(ready_state_to_u8(ReadyState::Closed), Ordering::Relaxed);
                return Err(FepError::peer_closed(format!("read frame length: {e}")));
            }
        }
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(FepError::new(
                "protocol.frame_too_large",
                fep_core::error::ErrorCategory::Protocol,
                format!("frame length {len} exceeds {MAX_FRAME_LEN}"),
            ));
        }
        let mut payload = BytesMut::zeroed(len as usize);
        stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| FepError::peer_closed(format!("read frame payload: {e}")))?;
        Ok(Some(payload.freeze()))
    }

    pub async fn write_frame(&self, payload: &[u8]) -> Result<(), FepError> {
        let mut framed = BytesMut::with_capacity(4 + payload.len());
        framed.put_u32(payload.len() as u32);
        framed.put_slice(payload);
        let mut stream = self.stream.lock().await;
        stream
            .write_all(&framed)
            .await
            .map_err(|e| FepError::not_connected(format!("write frame: {e}")))
    }

    pub async fn sign_on(&self, expect_ack: &[u8], payload: &[u8]) -> Result<HandshakeOutcome, FepError> {
        self.write_frame(payload).await?;
        match self.read_frame().await? {
            Some(ack) if ack.as_ref() == expect_ack => Ok(HandshakeOutcome::Accepted),
            _ => Ok(HandshakeOutcome::Rejected),
        }
    }
}

#[async_trait::async_trait]
impl Channel for TcpSocketChannel {
    fn ready_state(&self) -> ReadyState {
        ready_state_from_u8(self.state.load(Ordering::Relaxed))
    }

    fn peer_addr(&self) -> Option<TransportSocketAddr> {
        self.peer_addr
    }

    fn local_addr(&self) -> Option<TransportSocketAddr> {
        self.local_addr
    }

    async fn read_into(&self, buf: &mut (dyn BufMut + Send)) -> Result<usize, FepError> {
        match self.read_frame().await? {
            Some(bytes) => {
                let n = bytes.len();
                buf.put_slice(&bytes);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    async fn write_all(&self, buf: &mut (dyn Buf + Send)) -> Result<(), FepError> {
        let bytes = buf.copy_to_bytes(buf.remaining());
        self.write_frame(&bytes).await
    }

    async fn shutdown(&self) -> Result<(), FepError> {
        let mut stream = self.stream.lock().await;
        self.state.store(ready_state_to_u8(ReadyState::Closed), Ordering::Relaxed);
        // Idempotent per the trait contract: a socket already shut down
        // locally returns `NotConnected`, which we treat as success.
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(FepError::not_connected(format!("shutdown: {e}"))),
        }
    }
}
