//! The per-outbound correlation map named in §3 (`PendingRequest`) and used
//! by [`crate::client::DualChannelClient::send_and_receive`].
//!
//! # Why
//! `sendAndReceive` suspends the caller until the receive loop resolves a
//! sink or the deadline passes. A `DashMap` keyed by [`CorrelationKey`] gives
//! the insert-if-absent semantics §4.2 requires ("a collision on correlation
//! key fails the second send immediately, no overwrite") without a global
//! lock shared with the hot send/receive loops.
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fep_core::error::FepError;
use fep_core::ids::CorrelationKey;
use tokio::sync::oneshot;

/// What arrives at a suspended `sendAndReceive` caller.
#[derive(Debug)]
pub enum PendingOutcome {
    Response(Vec<u8>),
    Failed(FepError),
}

struct Slot {
    /// Absolute instant this slot is no longer awaited past (§3:
    /// `PendingRequest` carries "send timestamp, absolute deadline"). Read by
    /// [`PendingMap::sweep_expired`], independently of whatever deadline the
    /// awaiting caller's own `tokio::time::timeout` is running.
    deadline: Instant,
    sink: oneshot::Sender<PendingOutcome>,
}

/// Concurrent, correlation-keyed map of in-flight requests for one
/// [`crate::client::DualChannelClient`].
#[derive(Default)]
pub struct PendingMap {
    inner: DashMap<CorrelationKey, Slot>,
}

impl PendingMap {
    pub fn new() -> Self {
        Self { inner: DashMap::new() }
    }

    /// Registers a new pending request with its absolute deadline
    /// (`now + timeout_ms`). Fails with [`FepError::duplicate_correlation`]
    /// if the key is already in flight — compare-and-set via `DashMap`'s
    /// entry API, never overwriting.
    pub fn register(
        &self,
        key: CorrelationKey,
        timeout_ms: u64,
    ) -> Result<oneshot::Receiver<PendingOutcome>, FepError> {
        match self.inner.entry(key.clone()) {
            Entry::Occupied(_) => Err(FepError::duplicate_correlation(key)),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                let deadline = Instant::now() + Duration::from_millis(timeout_ms);
                vacant.insert(Slot { deadline, sink: tx });
                Ok(rx)
            }
        }
    }

    /// Resolves a pending slot with a decoded response. Returns `false` (and
    /// logs at the call site) when no slot matches — an unmatched response,
    /// or one that arrived after its sink was already cancelled/timed out.
    pub fn resolve(&self, key: &CorrelationKey, payload: Vec<u8>) -> bool {
        match self.inner.remove(key) {
            Some((_, slot)) => slot.sink.send(PendingOutcome::Response(payload)).is_ok(),
            None => false,
        }
    }

    /// Removes a slot without resolving it (used when the deadline in
    /// `sendAndReceive` itself fires — the receive loop may still resolve it
    /// concurrently, in which case this is a no-op since the entry is
    /// already gone).
    pub fn cancel(&self, key: &CorrelationKey) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Fails every in-flight slot with `reason`, used by `close()` (§4.2:
    /// "drains or cancels pending requests, each fails with `CANCELLED`").
    pub fn fail_all(&self, reason: FepError) {
        let keys: Vec<_> = self.inner.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, slot)) = self.inner.remove(&key) {
                let _ = slot.sink.send(PendingOutcome::Failed(clone_error(&reason)));
            }
        }
    }

    /// Reaps every slot whose absolute deadline has passed, failing it with
    /// a request-timeout error, and returns how many were reaped. This is
    /// the independent-of-any-awaiting-caller path §4.2 requires: a slot
    /// left behind by a dropped `sendAndReceive` future (or one a future
    /// caller variant never registers a waiter for) would otherwise sit in
    /// the map forever instead of being reclaimed once its deadline passes.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<CorrelationKey> = self
            .inner
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();
        let mut reaped = 0;
        for key in &expired {
            if let Some((_, slot)) = self.inner.remove(key) {
                let _ = slot.sink.send(PendingOutcome::Failed(FepError::request_timeout(format!(
                    "correlation key {key} exceeded its deadline before a caller collected it"
                ))));
                reaped += 1;
            }
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// `FepError` intentionally does not implement `Clone` (it boxes an
/// arbitrary `source`); `fail_all` needs one copy per pending slot, so it
/// rebuilds a fresh error with the same code/category/message instead of
/// cloning a source it cannot inspect.
fn clone_error(err: &FepError) -> FepError {
    FepError::new(err.code(), err.category(), err.message().to_owned())
}
