//! C1: the channel/profile registry — a concurrent, hot-reloadable store of
//! [`fep_core::model::Channel`]s, [`fep_core::model::ConnectionProfile`]s,
//! and the bindings between them, with subscriber fan-out for every mutation
//! (`spec.md` §4.1).
pub mod registry;
pub mod subscription;
pub mod watcher;

pub use registry::{Registry, StrictMode};
pub use subscription::{ConnectionsUpdated, SubscriptionHandle};
pub use watcher::{DEFAULT_POLL_INTERVAL, spawn_hot_reload};
