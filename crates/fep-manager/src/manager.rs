//! C4: the dynamic connection manager — the authoritative controller over
//! C2/C3 instances, keyed by channel id, reconciling against the registry's
//! (C1) desired state.
use std::sync::Arc;

use dashmap::DashMap;
use fep_core::ids::ChannelId;
use fep_registry::{ConnectionsUpdated, Registry};
use fep_transport_tcp::server::InboundHandler;
use fep_transport_tcp::{DualChannelClient, DualChannelServer};
use fep_core::model::{ChannelConnection, ConnectionProfile};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::error::ManagerError;

/// Either side of a channel binding, owned exclusively by the manager.
#[derive(Clone)]
pub enum ManagedConnection {
    Client(Arc<DualChannelClient>),
    Server(Arc<DualChannelServer>),
}

impl ManagedConnection {
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            ManagedConnection::Client(c) => c.channel_id(),
            ManagedConnection::Server(s) => s.channel_id(),
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, ManagedConnection::Client(_))
    }
}

/// A snapshot of one managed connection's status, used by query surfaces
/// and the operator CLI's `status`/`summary` commands.
#[derive(Clone, Debug)]
pub struct ConnectionStatus {
    pub channel_id: ChannelId,
    pub is_client: bool,
    pub connected: bool,
    pub connected_peers: u32,
}

pub struct ConnectionManager {
    registry: Arc<Registry>,
    connections: DashMap<ChannelId, ManagedConnection>,
    inbound_handler: Arc<dyn InboundHandler>,
    reconcile_lock: AsyncMutex<()>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<Registry>, inbound_handler: Arc<dyn InboundHandler>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            connections: DashMap::new(),
            inbound_handler,
            reconcile_lock: AsyncMutex::new(()),
        })
    }

    /// §4.4: constructs and starts (server-mode) or connects (client-mode)
    /// a connection for `channel_id`. Idempotent on an already-present id.
    pub async fn add_connection(self: &Arc<Self>, channel_id: &ChannelId) -> Result<(), ManagerError> {
        let _guard = self.reconcile_lock.lock().await;
        self.add_connection_locked(channel_id).await
    }

    async fn add_connection_locked(self: &Arc<Self>, channel_id: &ChannelId) -> Result<(), ManagerError> {
        if self.connections.contains_key(channel_id) {
            return Ok(());
        }
        let binding = self
            .registry
            .get_binding(channel_id)
            .ok_or_else(|| ManagerError::ChannelNotConfigured(channel_id.clone()))?;
        let profile = binding
            .resolved_profile
            .clone()
            .or_else(|| self.registry.get_profile(&binding.profile_id))
            .ok_or_else(|| ManagerError::ChannelNotConfigured(channel_id.clone()))?;

        if profile.server_mode {
            let server = DualChannelServer::new(channel_id.clone(), profile, self.inbound_handler.clone());
            server.start().await.map_err(ManagerError::Transport)?;
            self.connections.insert(channel_id.clone(), ManagedConnection::Server(server));
        } else {
            let client = DualChannelClient::new(channel_id.clone(), profile);
            client.connect().await.map_err(ManagerError::Transport)?;
            self.connections.insert(channel_id.clone(), ManagedConnection::Client(client));
        }
        info!(%channel_id, "connection added");
        Ok(())
    }

    /// Returns whether anything was removed.
    pub async fn remove_connection(self: &Arc<Self>, channel_id: &ChannelId) -> bool {
        let _guard = self.reconcile_lock.lock().await;
        self.remove_connection_locked(channel_id).await
    }

    async fn remove_connection_locked(self: &Arc<Self>, channel_id: &ChannelId) -> bool {
        let Some((_, connection)) = self.connections.remove(channel_id) else {
            return false;
        };
        match connection {
            ManagedConnection::Client(c) => {
                let _ = c.close().await;
            }
            ManagedConnection::Server(s) => {
                let _ = s.stop().await;
            }
        }
        info!(%channel_id, "connection removed");
        true
    }

    /// Client-mode only: close then connect. Fails with
    /// [`ManagerError::ServerMode`] for listeners.
    pub async fn reconnect(self: &Arc<Self>, channel_id: &ChannelId) -> Result<(), ManagerError> {
        let _guard = self.reconcile_lock.lock().await;
        let connection = self
            .connections
            .get(channel_id)
            .map(|e| e.clone())
            .ok_or_else(|| ManagerError::ChannelNotConfigured(channel_id.clone()))?;
        match connection {
            ManagedConnection::Server(_) => Err(ManagerError::ServerMode(channel_id.clone())),
            ManagedConnection::Client(client) => {
                client.close().await.map_err(ManagerError::Transport)?;
                client.connect().await.map_err(ManagerError::Transport)?;
                Ok(())
            }
        }
    }

    pub fn client_ids(&self) -> Vec<ChannelId> {
        self.connections
            .iter()
            .filter(|e| e.is_client())
            .map(|e| e.channel_id().clone())
            .collect()
    }

    pub fn server_ids(&self) -> Vec<ChannelId> {
        self.connections
            .iter()
            .filter(|e| !e.is_client())
            .map(|e| e.channel_id().clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|e| match e.value() {
                ManagedConnection::Client(c) => c.is_signed_on(),
                ManagedConnection::Server(s) => {
                    s.state() == fep_core::model::ServerState::Running
                }
            })
            .count()
    }

    pub fn status(&self, channel_id: &ChannelId) -> Option<ConnectionStatus> {
        self.connections.get(channel_id).map(|e| match e.value() {
            ManagedConnection::Client(c) => ConnectionStatus {
                channel_id: channel_id.clone(),
                is_client: true,
                connected: c.is_signed_on(),
                connected_peers: 0,
            },
            ManagedConnection::Server(s) => ConnectionStatus {
                channel_id: channel_id.clone(),
                is_client: false,
                connected: s.state() == fep_core::model::ServerState::Running,
                connected_peers: s.connected_peer_count(),
            },
        })
    }

    pub fn all_statuses(&self) -> Vec<ConnectionStatus> {
        self.connections
            .iter()
            .filter_map(|e| self.status(e.channel_id()))
            .collect()
    }

    /// Diffs current instances against the registry's active binding set and
    /// reconciles: adds missing, removes stale, leaves unchanged entries
    /// alone. Called both at startup and on every registry notification.
    pub async fn reconcile(self: &Arc<Self>, active: &[ChannelConnection], _profiles: &[ConnectionProfile]) {
        let _guard = self.reconcile_lock.lock().await;
        let desired: std::collections::BTreeSet<ChannelId> =
            active.iter().map(|b| b.channel_id.clone()).collect();

        let stale: Vec<ChannelId> = self
            .connections
            .iter()
            .map(|e| e.channel_id().clone())
            .filter(|id| !desired.contains(id))
            .collect();
        for id in stale {
            self.remove_connection_locked(&id).await;
        }

        for channel_id in desired {
            if self.connections.contains_key(&channel_id) {
                continue;
            }
            if let Err(e) = self.add_connection_locked(&channel_id).await {
                warn!(%channel_id, error = %e, "reconciliation failed to add connection");
            }
        }
    }
}

/// Bridges registry notifications into asynchronous reconciliation. Since
/// [`ConnectionsUpdated::on_update`] runs synchronously on the notifier's
/// thread (§5), it only hands the snapshot off to a detached task; the
/// manager's own `reconcile_lock` serializes that task against any
/// concurrent operator command (§4.4: "reconciliation is serialized;
/// concurrent operator commands are queued").
pub struct ReconcileOnUpdate(pub Arc<ConnectionManager>);

impl ConnectionsUpdated for ReconcileOnUpdate {
    fn on_update(&self, bindings: &[ChannelConnection], profiles: &[ConnectionProfile]) {
        let manager = self.0.clone();
        let bindings = bindings.to_vec();
        let profiles = profiles.to_vec();
        tokio::spawn(async move {
            manager.reconcile(&bindings, &profiles).await;
        });
    }
}
