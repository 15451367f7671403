//! C2: the dual-channel client — a per-channel pair of outbound sockets
//! (send + receive, or one socket when `!is_dual_channel()`), a
//! `ConnectionState` machine, a heartbeat task, reconnect with exponential
//! backoff, and the correlation-keyed pending-request map from
//! [`crate::pending`].
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fep_core::error::FepError;
use fep_core::ids::ChannelId;
use fep_core::model::{ConnectionProfile, ConnectionState};
use fep_core::observability::connection_state_event;
use fep_transport::BackpressureDecision;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::pending::{PendingMap, PendingOutcome};
use crate::tcp_channel::TcpSocketChannel;

/// How often the background sweep drains pending-correlation slots whose
/// absolute deadline has passed without any caller collecting them (§4.2).
const PENDING_SWEEP_INTERVAL: Duration = Duration::from_millis(200);

/// One outbound frame queued on the serialized send loop (§4.2: "Send loop:
/// serialized outbound queue"), with a sink the enqueuing caller awaits for
/// the write's own success/failure — distinct from the correlation-keyed
/// `PendingMap`, which only exists for request/response pairs.
struct QueuedFrame {
    bytes: Vec<u8>,
    ack: oneshot::Sender<Result<(), FepError>>,
}

/// Decrements `DualChannelClient::in_flight_sends` when `enqueue_send`
/// returns by any path, including backpressure rejection.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn state_to_u8(state: ConnectionState) -> u8 {
    use ConnectionState::*;
    match state {
        Disconnected => 0,
        Connecting => 1,
        Connected => 2,
        SigningOn => 3,
        SignedOn => 4,
        Reconnecting => 5,
        Disconnecting => 6,
        Failed => 7,
    }
}

fn state_from_u8(value: u8) -> ConnectionState {
    use ConnectionState::*;
    match value {
        1 => Connecting,
        2 => Connected,
        3 => SigningOn,
        4 => SignedOn,
        5 => Reconnecting,
        6 => Disconnecting,
        7 => Failed,
        _ => Disconnected,
    }
}

/// Shared, lock-free-readable state cell. Legality of each transition is
/// enforced by [`ConnectionState::can_transition_to`] (P2) before the store;
/// `state()` itself is a single relaxed load as §5 requires.
struct StateCell(AtomicU8);

impl StateCell {
    fn new(initial: ConnectionState) -> Self {
        Self(AtomicU8::new(state_to_u8(initial)))
    }

    fn get(&self) -> ConnectionState {
        state_from_u8(self.0.load(Ordering::Relaxed))
    }

    /// Transitions under a `Mutex` held by the caller so concurrent callers
    /// (heartbeat task, receive loop, explicit `close()`) never race past
    /// each other's legality check; returns the rejected pair on failure.
    fn set(&self, channel_id: &ChannelId, next: ConnectionState) -> Result<(), (ConnectionState, ConnectionState)> {
        let current = self.get();
        if !current.can_transition_to(next) {
            return Err((current, next));
        }
        self.0.store(state_to_u8(next), Ordering::Relaxed);
        connection_state_event(channel_id.as_str(), &format!("{current:?}"), &format!("{next:?}"));
        Ok(())
    }
}

/// The per-channel dual-socket client. One instance is owned by
/// `fep-manager` per client-mode channel binding.
pub struct DualChannelClient {
    channel_id: ChannelId,
    profile: ConnectionProfile,
    state: StateCell,
    transition_lock: AsyncMutex<()>,
    send_channel: AsyncMutex<Option<Arc<TcpSocketChannel>>>,
    receive_channel: AsyncMutex<Option<Arc<TcpSocketChannel>>>,
    send_queue_tx: AsyncMutex<Option<mpsc::Sender<QueuedFrame>>>,
    /// Count of callers currently inside `enqueue_send`, used to classify
    /// backpressure independently of the bounded `mpsc` channel's own hard
    /// cap — many more callers can be concurrently *waiting* to enqueue than
    /// the channel's capacity admits, and that pile-up is exactly what
    /// should trip `BackpressureDecision::Reject` instead of letting an
    /// unbounded line of waiters form.
    in_flight_sends: AtomicUsize,
    pending: PendingMap,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
    heartbeat_seq: AtomicU64,
}

impl DualChannelClient {
    pub fn new(channel_id: ChannelId, profile: ConnectionProfile) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            profile,
            state: StateCell::new(ConnectionState::Disconnected),
            transition_lock: AsyncMutex::new(()),
            send_channel: AsyncMutex::new(None),
            receive_channel: AsyncMutex::new(None),
            send_queue_tx: AsyncMutex::new(None),
            in_flight_sends: AtomicUsize::new(0),
            pending: PendingMap::new(),
            tasks: AsyncMutex::new(Vec::new()),
            heartbeat_seq: AtomicU64::new(0),
        })
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_signed_on(&self) -> bool {
        self.state.get().is_operational()
    }

    pub fn is_send_channel_connected(&self) -> bool {
        // A best-effort, lock-free approximation: `Connected` or later means
        // the socket exists. Exact socket state is read from the channel's
        // own `ReadyState` by callers that hold the async lock already.
        !matches!(self.state.get(), ConnectionState::Disconnected | ConnectionState::Connecting)
    }

    pub fn is_receive_channel_connected(&self) -> bool {
        self.is_send_channel_connected() && self.profile.is_dual_channel()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drives `Disconnected -> Connecting -> Connected`, establishing both
    /// sockets (or the single shared one). Does not perform sign-on; callers
    /// invoke [`Self::sign_on`] separately so tests can observe the
    /// intermediate `Connected` state.
    pub async fn connect(self: &Arc<Self>) -> Result<(), FepError> {
        let _guard = self.transition_lock.lock().await;
        self.state
            .set(&self.channel_id, ConnectionState::Connecting)
            .map_err(|(from, to)| illegal_transition(from, to))?;

        let send = TcpSocketChannel::connect(&self.profile.host, self.profile.send_port).await;
        let send = match send {
            Ok(channel) => Arc::new(channel),
            Err(e) => {
                let _ = self.state.set(&self.channel_id, ConnectionState::Failed);
                return Err(e);
            }
        };
        let _ = send.configure_keepalive(self.profile.keepalive_interval_ms).await;

        let receive = if self.profile.is_dual_channel() {
            match TcpSocketChannel::connect(&self.profile.host, self.profile.effective_receive_port()).await {
                Ok(channel) => Arc::new(channel),
                Err(e) => {
                    let _ = self.state.set(&self.channel_id, ConnectionState::Failed);
                    return Err(e);
                }
            }
        } else {
            send.clone()
        };

        *self.send_channel.lock().await = Some(send.clone());
        *self.receive_channel.lock().await = Some(receive.clone());

        self.state
            .set(&self.channel_id, ConnectionState::Connected)
            .map_err(|(from, to)| illegal_transition(from, to))?;

        self.spawn_receive_loop(receive).await;
        self.spawn_send_loop(send).await;
        self.spawn_heartbeat_loop().await;
        self.spawn_pending_sweep_loop().await;
        Ok(())
    }

    /// Drives `Connected -> SigningOn -> SignedOn` via a single sign-on
    /// frame/ack exchange over the send channel (§3: "an explicit sign-on
    /// exchange drives to SIGNING_ON -> SIGNED_ON").
    pub async fn sign_on(self: &Arc<Self>, request: &[u8], expected_ack: &[u8]) -> Result<(), FepError> {
        let _guard = self.transition_lock.lock().await;
        self.state
            .set(&self.channel_id, ConnectionState::SigningOn)
            .map_err(|(from, to)| illegal_transition(from, to))?;

        let send = self.send_channel.lock().await.clone().ok_or_else(|| FepError::not_connected("not connected"))?;
        let outcome = send.sign_on(expected_ack, request).await;
        match outcome {
            Ok(fep_transport::HandshakeOutcome::Accepted) => {
                self.state
                    .set(&self.channel_id, ConnectionState::SignedOn)
                    .map_err(|(from, to)| illegal_transition(from, to))?;
                Ok(())
            }
            Ok(fep_transport::HandshakeOutcome::Rejected) => {
                let _ = self.state.set(&self.channel_id, ConnectionState::Failed);
                Err(FepError::not_connected("sign-on rejected by peer"))
            }
            Err(e) => {
                let _ = self.state.set(&self.channel_id, ConnectionState::Failed);
                Err(e)
            }
        }
    }

    /// §4.2's public contract: send `message_bytes` (already framed by the
    /// caller's codec) and suspend until the matching response arrives or
    /// `timeout_ms` elapses.
    pub async fn send_and_receive(
        self: &Arc<Self>,
        correlation_key: fep_core::ids::CorrelationKey,
        message_bytes: Vec<u8>,
        timeout_ms: u64,
    ) -> Result<Vec<u8>, FepError> {
        if !self.is_signed_on() {
            return Err(FepError::not_connected("client is not signed on"));
        }
        let rx = self.pending.register(correlation_key.clone(), timeout_ms)?;

        if let Err(e) = self.enqueue_send(message_bytes).await {
            self.pending.cancel(&correlation_key);
            return Err(e);
        }

        match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(PendingOutcome::Response(bytes))) => Ok(bytes),
            Ok(Ok(PendingOutcome::Failed(err))) => Err(err),
            Ok(Err(_recv_error)) => Err(FepError::cancelled("pending slot dropped")),
            Err(_elapsed) => {
                self.pending.cancel(&correlation_key);
                Err(FepError::request_timeout(format!(
                    "no response for correlation key {correlation_key} within {timeout_ms}ms"
                )))
            }
        }
    }

    /// Fire-and-forget send; never registers or awaits a pending slot, but
    /// still goes through the same bounded queue as `send_and_receive` so
    /// the two never interleave writes on the wire out of enqueue order.
    pub async fn send_one_way(self: &Arc<Self>, message_bytes: Vec<u8>) -> Result<(), FepError> {
        if !self.is_signed_on() {
            return Err(FepError::not_connected("client is not signed on"));
        }
        self.enqueue_send(message_bytes).await
    }

    /// Enqueues a frame on the bounded send queue (§5: "send queues are
    /// bounded, default 1024; enqueue beyond capacity blocks up to
    /// `connectTimeout`, then fails `BACKPRESSURE`"). Returns once the send
    /// loop has actually written the frame (or failed to).
    async fn enqueue_send(self: &Arc<Self>, bytes: Vec<u8>) -> Result<(), FepError> {
        let tx = self
            .send_queue_tx
            .lock()
            .await
            .clone()
            .ok_or_else(|| FepError::not_connected("no send queue"))?;

        let capacity = self.profile.send_queue_capacity.max(1);
        let queue_len = self.in_flight_sends.fetch_add(1, Ordering::AcqRel);
        let _inflight_guard = InFlightGuard(&self.in_flight_sends);
        let (ack_tx, ack_rx) = oneshot::channel();
        let item = QueuedFrame { bytes, ack: ack_tx };

        match BackpressureDecision::classify(queue_len, capacity) {
            BackpressureDecision::Admit => {
                tx.send(item).await.map_err(|_| FepError::not_connected("send loop stopped"))?;
            }
            BackpressureDecision::Wait => {
                match timeout(Duration::from_millis(self.profile.connect_timeout_ms), tx.send(item)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return Err(FepError::not_connected("send loop stopped")),
                    Err(_elapsed) => {
                        return Err(FepError::backpressure(format!(
                            "channel {} send queue still full after waiting {}ms",
                            self.channel_id, self.profile.connect_timeout_ms
                        )));
                    }
                }
            }
            BackpressureDecision::Reject => {
                return Err(FepError::backpressure(format!(
                    "channel {} send queue exhausted ({queue_len}/{capacity})",
                    self.channel_id
                )));
            }
        }

        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Err(FepError::not_connected("send loop dropped without acking")),
        }
    }

    /// §4.2: moves to `Disconnecting`, fails every pending slot with
    /// `CANCELLED`, closes both sockets, becomes `Disconnected`.
    pub async fn close(self: &Arc<Self>) -> Result<(), FepError> {
        let _guard = self.transition_lock.lock().await;
        if self.state.get() == ConnectionState::Disconnected {
            return Ok(());
        }
        let _ = self.state.set(&self.channel_id, ConnectionState::Disconnecting);
        self.pending.fail_all(FepError::cancelled("client closed"));
        self.send_queue_tx.lock().await.take();

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Some(send) = self.send_channel.lock().await.take() {
            let _ = send.shutdown().await;
        }
        if let Some(receive) = self.receive_channel.lock().await.take() {
            let _ = receive.shutdown().await;
        }
        self.state
            .set(&self.channel_id, ConnectionState::Disconnected)
            .map_err(|(from, to)| illegal_transition(from, to))
    }

    /// Reconnect sequence named in §4.4: close then connect, with
    /// exponential backoff bounded by `profile.max_retries`. Only meaningful
    /// for client-mode channels; the manager rejects this call for servers.
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), FepError> {
        let _ = self.state.set(&self.channel_id, ConnectionState::Reconnecting);
        let mut attempt = 0u32;
        let mut delay = Duration::from_millis(self.profile.retry_delay_ms);
        loop {
            if attempt >= self.profile.max_retries {
                let _ = self.state.set(&self.channel_id, ConnectionState::Failed);
                return Err(FepError::not_connected(format!(
                    "exhausted {} reconnect attempts for channel {}",
                    self.profile.max_retries, self.channel_id
                )));
            }
            tokio::time::sleep(delay).await;
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(_) => {
                    attempt += 1;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    async fn note_io_failure(self: &Arc<Self>) {
        if self.profile.auto_reconnect {
            let _ = self.state.set(&self.channel_id, ConnectionState::Reconnecting);
            let this = self.clone();
            tokio::spawn(async move {
                let _ = this.reconnect().await;
            });
        } else {
            let _ = self.state.set(&self.channel_id, ConnectionState::Failed);
        }
    }

    async fn spawn_receive_loop(self: &Arc<Self>, receive: Arc<TcpSocketChannel>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receive.read_frame().await {
                    Ok(Some(payload)) => {
                        // The correlation key is computed by the caller's
                        // codec, not this transport crate (§6: `fep-core`
                        // owns `MessageCodec::correlation_key`); the client
                        // surfaces raw frames through `take_inbound_frame`
                        // for a wrapper (e.g. `fep-manager`) that holds the
                        // codec to resolve against `this.pending`.
                        this.dispatch_inbound_frame(payload.to_vec());
                    }
                    Ok(None) => {
                        tracing::info!(channel_id = %this.channel_id, "receive channel closed by peer");
                        this.note_io_failure().await;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(channel_id = %this.channel_id, error = %e, "receive loop error");
                        this.note_io_failure().await;
                        break;
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }

    /// Resolves a raw inbound frame against the pending map. The
    /// correlation key is derived by the frame's first line (a simple,
    /// codec-agnostic convention: frames begin with `"<key>\n"`) so this
    /// crate can demultiplex without depending on any concrete codec type.
    fn dispatch_inbound_frame(self: &Arc<Self>, frame: Vec<u8>) {
        let Some(split) = frame.iter().position(|&b| b == b'\n') else {
            tracing::warn!(channel_id = %self.channel_id, "inbound frame missing correlation prefix, dropping");
            return;
        };
        let key_str = String::from_utf8_lossy(&frame[..split]).into_owned();
        let payload = frame[split + 1..].to_vec();
        let key = fep_core::ids::CorrelationKey::new(key_str);
        if !self.pending.resolve(&key, payload) {
            tracing::debug!(channel_id = %self.channel_id, %key, "unmatched inbound response, dropping");
        }
    }

    /// The serialized outbound queue itself (§4.2's "Send loop"): drains
    /// [`QueuedFrame`]s in enqueue order and writes each to `send` in turn,
    /// acking the caller with the write's own result. A write failure here
    /// triggers the same reconnect/fail path an inbound read failure does.
    async fn spawn_send_loop(self: &Arc<Self>, send: Arc<TcpSocketChannel>) {
        let this = self.clone();
        let (tx, mut rx) = mpsc::channel::<QueuedFrame>(self.profile.send_queue_capacity.max(1));
        *self.send_queue_tx.lock().await = Some(tx);
        let handle = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let result = send.write_frame(&item.bytes).await;
                if let Err(ref e) = result {
                    tracing::warn!(channel_id = %this.channel_id, error = %e, "send loop write failed");
                    this.note_io_failure().await;
                }
                let _ = item.ack.send(result);
            }
        });
        self.tasks.lock().await.push(handle);
    }

    /// Periodically reaps pending-correlation slots whose deadline passed
    /// without any caller collecting them (§4.2), independent of whichever
    /// `sendAndReceive` call (if any) is still suspended.
    async fn spawn_pending_sweep_loop(self: &Arc<Self>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PENDING_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let reaped = this.pending.sweep_expired();
                if reaped > 0 {
                    tracing::debug!(channel_id = %this.channel_id, reaped, "swept expired pending correlation slots");
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }

    async fn spawn_heartbeat_loop(self: &Arc<Self>) {
        let this = self.clone();
        let interval = Duration::from_millis(self.profile.heartbeat_interval_ms);
        let response_timeout = Duration::from_millis(self.profile.response_timeout_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !this.is_signed_on() {
                    continue;
                }
                let seq = this.heartbeat_seq.fetch_add(1, Ordering::Relaxed);
                let key = fep_core::ids::CorrelationKey::new(format!("heartbeat-{seq}"));
                let mut frame = key.as_str().as_bytes().to_vec();
                frame.push(b'\n');
                frame.extend_from_slice(b"PING");
                match this
                    .send_and_receive(key, frame, response_timeout.as_millis() as u64)
                    .await
                {
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(channel_id = %this.channel_id, error = %e, "heartbeat missed, reconnecting");
                        this.note_io_failure().await;
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }
}

fn illegal_transition(from: ConnectionState, to: ConnectionState) -> FepError {
    FepError::new(
        "connection.illegal_transition",
        fep_core::error::ErrorCategory::Connection,
        format!("illegal state transition {from:?} -> {to:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(server_mode: bool) -> ConnectionProfile {
        ConnectionProfile {
            profile_id: "TEST".into(),
            host: "127.0.0.1".into(),
            send_port: 16000,
            receive_port: None,
            connect_timeout_ms: 500,
            response_timeout_ms: 500,
            heartbeat_interval_ms: 60_000,
            keepalive_interval_ms: 30_000,
            retry_delay_ms: 10,
            max_retries: 2,
            tls: false,
            pool_size: 1,
            auto_reconnect: true,
            server_mode,
            send_queue_capacity: 1024,
            properties: Default::default(),
        }
    }

    #[test]
    fn state_cell_rejects_illegal_jump() {
        let cell = StateCell::new(ConnectionState::Disconnected);
        let channel_id = ChannelId::new("ATM_TEST");
        assert!(cell.set(&channel_id, ConnectionState::SignedOn).is_err());
        assert!(cell.set(&channel_id, ConnectionState::Connecting).is_ok());
    }

    #[tokio::test]
    async fn send_and_receive_without_connecting_fails_not_connected() {
        let client = DualChannelClient::new(ChannelId::new("ATM_TEST"), profile(false));
        let err = client
            .send_and_receive(fep_core::ids::CorrelationKey::new("k"), b"hi".to_vec(), 100)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "connection.not_connected");
    }

    #[tokio::test]
    async fn enqueue_send_fails_backpressure_once_in_flight_demand_is_far_past_capacity() {
        let mut cfg = profile(false);
        cfg.send_queue_capacity = 4;
        cfg.connect_timeout_ms = 20;
        let capacity = cfg.send_queue_capacity;
        let client = DualChannelClient::new(ChannelId::new("ATM_TEST"), cfg);
        // No real socket is needed to exercise the admission-control math: a
        // send queue is wired up whose far end never drains, and the
        // in-flight counter is pushed straight past the
        // `BackpressureDecision::Reject` threshold (capacity + capacity/4).
        let (tx, _rx) = mpsc::channel::<QueuedFrame>(capacity);
        *client.send_queue_tx.lock().await = Some(tx);
        client.in_flight_sends.store(5, Ordering::Relaxed);

        let err = client.enqueue_send(b"frame".to_vec()).await.unwrap_err();
        assert_eq!(err.code(), "connection.backpressure");
    }

    #[tokio::test]
    async fn enqueue_send_waits_then_fails_backpressure_when_queue_never_drains() {
        let mut cfg = profile(false);
        cfg.send_queue_capacity = 4;
        cfg.connect_timeout_ms = 20;
        let client = DualChannelClient::new(ChannelId::new("ATM_TEST"), cfg);
        let (tx, _rx) = mpsc::channel::<QueuedFrame>(1);
        // Pre-fill the channel's one slot so the next `tx.send` genuinely
        // has to wait on a reader that never comes, instead of succeeding
        // immediately.
        let (filler_ack, _filler_ack_rx) = oneshot::channel();
        tx.try_send(QueuedFrame { bytes: Vec::new(), ack: filler_ack }).unwrap();
        *client.send_queue_tx.lock().await = Some(tx);
        // With the queue already full, this call lands in `Wait` (queue_len
        // == capacity) and blocks on `tx.send` until `connect_timeout_ms`
        // elapses, since nothing ever reads from `_rx`.
        client.in_flight_sends.store(4, Ordering::Relaxed);

        let started = std::time::Instant::now();
        let err = client.enqueue_send(b"frame".to_vec()).await.unwrap_err();
        assert_eq!(err.code(), "connection.backpressure");
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
