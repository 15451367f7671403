//! C4: the dynamic connection manager — lifecycle orchestration over the C2
//! (`fep_transport_tcp::DualChannelClient`) and C3
//! (`fep_transport_tcp::DualChannelServer`) instances, reconciling against
//! C1 (`fep_registry::Registry`) configuration changes.
pub mod error;
pub mod manager;

pub use error::ManagerError;
pub use manager::{ConnectionManager, ConnectionStatus, ManagedConnection, ReconcileOnUpdate};
