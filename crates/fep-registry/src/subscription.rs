//! The configuration-change fan-out named in §4.1 ("every mutation invokes
//! all observers with unmodifiable snapshot views"), reimplemented per §9's
//! design note as explicit subscription handles rather than the source's
//! weak-reference GC convenience: Rust has no GC to rely on, so leak safety
//! here comes from callers releasing their handle, not from a collector
//! pruning dead weak refs on every notify.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use fep_core::model::{ChannelConnection, ConnectionProfile};

/// Observer of registry mutations. `on_update` receives unmodifiable
/// snapshots (plain owned `Vec`s) of the full current binding/profile sets —
/// never a partial merge of old and new (P7).
pub trait ConnectionsUpdated: Send + Sync + 'static {
    fn on_update(&self, bindings: &[ChannelConnection], profiles: &[ConnectionProfile]);
}

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    entries: DashMap<u64, Arc<dyn ConnectionsUpdated>>,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, subscriber: Arc<dyn ConnectionsUpdated>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, subscriber);
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.remove(&id);
    }

    pub(crate) fn notify_all(&self, bindings: &[ChannelConnection], profiles: &[ConnectionProfile]) {
        for entry in self.entries.iter() {
            entry.value().on_update(bindings, profiles);
        }
    }
}

/// A handle returned from [`crate::Registry::subscribe`]. Dropping it does
/// **not** unsubscribe (unlike a weak-ref design) — callers must call
/// [`Self::unsubscribe`] explicitly, which is the whole point of making the
/// lifetime contract explicit rather than implicit.
pub struct SubscriptionHandle {
    id: u64,
    subscribers: Arc<Subscribers>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, subscribers: Arc<Subscribers>) -> Self {
        Self { id, subscribers }
    }

    pub fn unsubscribe(self) {
        self.subscribers.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<usize>);

    impl ConnectionsUpdated for Recorder {
        fn on_update(&self, _bindings: &[ChannelConnection], _profiles: &[ConnectionProfile]) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let subs = Arc::new(Subscribers::new());
        let recorder = Arc::new(Recorder(Mutex::new(0)));
        let id = subs.insert(recorder.clone());
        subs.notify_all(&[], &[]);
        assert_eq!(*recorder.0.lock().unwrap(), 1);

        let handle = SubscriptionHandle::new(id, subs.clone());
        handle.unsubscribe();
        subs.notify_all(&[], &[]);
        assert_eq!(*recorder.0.lock().unwrap(), 1);
    }
}
