//! C3: the dual-channel server — the listening mirror of [`crate::client`].
//! Binds send/receive listening sockets (or one shared socket), accepts
//! peers, and dispatches each decoded inbound frame to a registered
//! [`InboundHandler`] (the transaction pipeline, in production).
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fep_core::error::FepError;
use fep_core::ids::ChannelId;
use fep_core::model::{ConnectionProfile, ServerState};
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::tcp_channel::TcpSocketChannel;

/// Receives decoded inbound frames and, optionally, produces a response
/// frame to write back on the same socket. Implemented by the transaction
/// pipeline in production; a recording test double otherwise.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    async fn handle(&self, channel_id: &ChannelId, frame: Vec<u8>) -> Option<Vec<u8>>;
}

fn state_to_u8(state: ServerState) -> u8 {
    use ServerState::*;
    match state {
        Stopped => 0,
        Starting => 1,
        Running => 2,
        Stopping => 3,
        Failed => 4,
    }
}

fn state_from_u8(value: u8) -> ServerState {
    use ServerState::*;
    match value {
        1 => Starting,
        2 => Running,
        3 => Stopping,
        4 => Failed,
        _ => Stopped,
    }
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new(initial: ServerState) -> Self {
        Self(AtomicU8::new(state_to_u8(initial)))
    }

    fn get(&self) -> ServerState {
        state_from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, next: ServerState) -> Result<(), (ServerState, ServerState)> {
        let current = self.get();
        if !current.can_transition_to(next) {
            return Err((current, next));
        }
        self.0.store(state_to_u8(next), Ordering::Relaxed);
        Ok(())
    }
}

/// The listening side of a channel binding. Cannot be "reconnected" (§4.3):
/// operators stop then start a fresh instance.
pub struct DualChannelServer {
    channel_id: ChannelId,
    profile: ConnectionProfile,
    state: StateCell,
    connected_peers: AtomicU32,
    actual_send_port: AsyncMutex<Option<u16>>,
    actual_receive_port: AsyncMutex<Option<u16>>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
    handler: Arc<dyn InboundHandler>,
}

impl DualChannelServer {
    pub fn new(channel_id: ChannelId, profile: ConnectionProfile, handler: Arc<dyn InboundHandler>) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            profile,
            state: StateCell::new(ServerState::Stopped),
            connected_peers: AtomicU32::new(0),
            actual_send_port: AsyncMutex::new(None),
            actual_receive_port: AsyncMutex::new(None),
            tasks: AsyncMutex::new(Vec::new()),
            handler,
        })
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    pub fn connected_peer_count(&self) -> u32 {
        self.connected_peers.load(Ordering::Relaxed)
    }

    pub async fn actual_send_port(&self) -> Option<u16> {
        *self.actual_send_port.lock().await
    }

    pub async fn actual_receive_port(&self) -> Option<u16> {
        *self.actual_receive_port.lock().await
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), FepError> {
        self.state
            .set(ServerState::Starting)
            .map_err(|(f, t)| illegal_transition(f, t))?;

        let send_listener = TcpListener::bind((self.profile.host.as_str(), self.profile.send_port))
            .await
            .map_err(|e| {
                let _ = self.state.set(ServerState::Failed);
                FepError::not_connected(format!("bind send port: {e}"))
            })?;
        *self.actual_send_port.lock().await = Some(
            send_listener
                .local_addr()
                .map(|a| a.port())
                .unwrap_or(self.profile.send_port),
        );

        let receive_listener = if self.profile.is_dual_channel() {
            let listener = TcpListener::bind((self.profile.host.as_str(), self.profile.effective_receive_port()))
                .await
                .map_err(|e| {
                    let _ = self.state.set(ServerState::Failed);
                    FepError::not_connected(format!("bind receive port: {e}"))
                })?;
            *self.actual_receive_port.lock().await = Some(listener.local_addr().map(|a| a.port()).unwrap_or(0));
            Some(listener)
        } else {
            *self.actual_receive_port.lock().await = self.actual_send_port.lock().await.to_owned();
            None
        };

        self.state
            .set(ServerState::Running)
            .map_err(|(f, t)| illegal_transition(f, t))?;

        self.spawn_accept_loop(send_listener).await;
        if let Some(listener) = receive_listener {
            self.spawn_accept_loop(listener).await;
        }
        Ok(())
    }

    async fn spawn_accept_loop(self: &Arc<Self>, listener: TcpListener) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        this.connected_peers.fetch_add(1, Ordering::Relaxed);
                        let peer_handler = this.clone();
                        tokio::spawn(async move {
                            let channel = TcpSocketChannel::from_stream(stream);
                            tracing::info!(channel_id = %peer_handler.channel_id, %peer, "peer connected");
                            peer_handler.run_peer(channel).await;
                            peer_handler.connected_peers.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(channel_id = %this.channel_id, error = %e, "accept failed");
                        if this.state.get() != ServerState::Running {
                            break;
                        }
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }

    async fn run_peer(self: &Arc<Self>, channel: TcpSocketChannel) {
        loop {
            match channel.read_frame().await {
                Ok(Some(frame)) => {
                    if let Some(response) = self.handler.handle(&self.channel_id, frame.to_vec()).await {
                        if let Err(e) = channel.write_frame(&response).await {
                            tracing::warn!(channel_id = %self.channel_id, error = %e, "failed writing response to peer");
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(channel_id = %self.channel_id, error = %e, "peer read error");
                    break;
                }
            }
        }
    }

    pub async fn stop(self: &Arc<Self>) -> Result<(), FepError> {
        self.state
            .set(ServerState::Stopping)
            .map_err(|(f, t)| illegal_transition(f, t))?;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.state.set(ServerState::Stopped).map_err(|(f, t)| illegal_transition(f, t))
    }
}

fn illegal_transition(from: ServerState, to: ServerState) -> FepError {
    FepError::new(
        "connection.illegal_transition",
        fep_core::error::ErrorCategory::Connection,
        format!("illegal server state transition {from:?} -> {to:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl InboundHandler for EchoHandler {
        async fn handle(&self, _channel_id: &ChannelId, frame: Vec<u8>) -> Option<Vec<u8>> {
            Some(frame)
        }
    }

    fn profile() -> ConnectionProfile {
        ConnectionProfile {
            profile_id: "TEST".into(),
            host: "127.0.0.1".into(),
            send_port: 0,
            receive_port: None,
            connect_timeout_ms: 500,
            response_timeout_ms: 500,
            heartbeat_interval_ms: 60_000,
            keepalive_interval_ms: 30_000,
            retry_delay_ms: 10,
            max_retries: 2,
            tls: false,
            pool_size: 1,
            auto_reconnect: false,
            server_mode: true,
            send_queue_capacity: 1024,
            properties: Default::default(),
        }
    }

    #[tokio::test]
    async fn start_then_stop_reaches_running_then_stopped() {
        let server = DualChannelServer::new(ChannelId::new("ATM_SRV"), profile(), Arc::new(EchoHandler));
        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.actual_send_port().await.unwrap() > 0);
        server.stop().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
