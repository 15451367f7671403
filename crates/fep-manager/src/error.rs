//! The connection-manager-specific error reasons named in §4.4:
//! `CHANNEL_NOT_CONFIGURED` (no such registry entry) and `SERVER_MODE`
//! (`reconnect` attempted against a listener).
use fep_core::error::FepError;
use fep_core::ids::ChannelId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("channel {0} has no registry binding")]
    ChannelNotConfigured(ChannelId),
    #[error("channel {0} is server-mode; reconnect only applies to client-mode channels")]
    ServerMode(ChannelId),
    #[error(transparent)]
    Transport(#[from] FepError),
}

impl ManagerError {
    pub fn code(&self) -> &'static str {
        match self {
            ManagerError::ChannelNotConfigured(_) => "manager.channel_not_configured",
            ManagerError::ServerMode(_) => "manager.server_mode",
            ManagerError::Transport(e) => e.code(),
        }
    }
}
