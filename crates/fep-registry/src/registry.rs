//! C1: the channel/profile registry. A process-wide singleton in the source
//! system; reimplemented per §9 as an explicit, dependency-injected service
//! constructed once at startup (`Registry::new`) and handed to every
//! consumer as an `Arc<Registry>` — no hidden global access.
use std::sync::Arc;

use dashmap::DashMap;
use fep_core::configuration::{ConfigDocument, ConfigSource, binding_from_doc};
use fep_core::error::FepError;
use fep_core::ids::{ChannelId, ProfileId};
use fep_core::model::{Channel, ChannelConnection, ConnectionProfile};
use tracing::warn;

use crate::subscription::{ConnectionsUpdated, SubscriptionHandle, Subscribers};

/// Whether a malformed individual entry fails the whole `load()` call or is
/// skipped with a warning (§4.1: "individual malformed entries are skipped
/// with a warning when strict mode is off").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrictMode {
    Strict,
    Tolerant,
}

pub struct Registry {
    profiles: DashMap<ProfileId, ConnectionProfile>,
    channels: DashMap<ChannelId, Channel>,
    bindings: DashMap<ChannelId, ChannelConnection>,
    subscribers: Arc<Subscribers>,
    strict: StrictMode,
}

impl Registry {
    pub fn new(strict: StrictMode) -> Arc<Self> {
        Arc::new(Self {
            profiles: DashMap::new(),
            channels: DashMap::new(),
            bindings: DashMap::new(),
            subscribers: Arc::new(Subscribers::new()),
            strict,
        })
    }

    /// Replaces current state from a configuration source (§4.1). v2
    /// populates profiles and bindings and resolves every binding's profile
    /// pointer; v1 populates channel/schema metadata only — no bindings are
    /// resolvable from a v1 document. Never leaves partial state: the
    /// replacement happens only after the whole document parses and
    /// (in strict mode) validates cleanly.
    pub fn load(&self, source: &dyn ConfigSource) -> Result<(), FepError> {
        let bytes = source.load()?;
        let document = ConfigDocument::parse(&bytes)?;

        match document {
            ConfigDocument::V1(v1) => {
                let mut new_channels = Vec::with_capacity(v1.channels.len());
                for channel in v1.channels {
                    if let Err(reason) = channel.validate() {
                        self.reject_or_warn(&reason)?;
                        continue;
                    }
                    new_channels.push(channel);
                }
                self.channels.clear();
                for channel in new_channels {
                    self.channels.insert(channel.id.clone(), channel);
                }
                self.bindings.clear();
                self.profiles.clear();
            }
            ConfigDocument::V2(v2) => {
                let mut new_profiles = Vec::with_capacity(v2.connection_profiles.len());
                for (id, profile) in v2.connection_profiles {
                    if let Err(reason) = profile.validate() {
                        self.reject_or_warn(&reason)?;
                        continue;
                    }
                    let _ = id;
                    new_profiles.push(profile);
                }

                let mut new_channels = Vec::with_capacity(v2.channels.len());
                let mut new_bindings = Vec::with_capacity(v2.channels.len());
                for (id, doc) in &v2.channels {
                    if let Err(reason) = doc.channel.validate() {
                        self.reject_or_warn(&reason)?;
                        continue;
                    }
                    let mut binding = binding_from_doc(id, doc);
                    if let Err(reason) = binding.validate() {
                        self.reject_or_warn(&reason)?;
                        continue;
                    }
                    if let Some(profile) = new_profiles.iter().find(|p| p.profile_id.as_str() == binding.profile_id.as_str())
                    {
                        binding.resolved_profile = Some(profile.clone());
                    } else if binding.active {
                        warn!(channel_id = %binding.channel_id, profile_id = %binding.profile_id, "dangling profile reference, binding left unresolved");
                    }
                    new_channels.push(doc.channel.clone());
                    new_bindings.push(binding);
                }

                self.profiles.clear();
                for profile in new_profiles {
                    self.profiles.insert(profile.profile_id.clone(), profile);
                }
                self.channels.clear();
                for channel in new_channels {
                    self.channels.insert(channel.id.clone(), channel);
                }
                self.bindings.clear();
                for binding in new_bindings {
                    self.bindings.insert(binding.channel_id.clone(), binding);
                }
            }
        }

        self.notify_subscribers();
        Ok(())
    }

    fn reject_or_warn(&self, reason: &str) -> Result<(), FepError> {
        match self.strict {
            StrictMode::Strict => Err(FepError::config(reason.to_owned())),
            StrictMode::Tolerant => {
                warn!(reason, "skipping malformed configuration entry");
                Ok(())
            }
        }
    }

    /// Runtime registration (§4.1): synchronous validation, never leaves
    /// partial state on failure.
    pub fn register_profile(&self, profile: ConnectionProfile) -> Result<(), FepError> {
        profile.validate().map_err(FepError::config)?;
        self.profiles.insert(profile.profile_id.clone(), profile);
        self.reresolve_bindings();
        self.notify_subscribers();
        Ok(())
    }

    pub fn unregister_profile(&self, id: &ProfileId) -> bool {
        let removed = self.profiles.remove(id).is_some();
        if removed {
            self.reresolve_bindings();
            self.notify_subscribers();
        }
        removed
    }

    pub fn register_binding(&self, channel: Channel, mut binding: ChannelConnection) -> Result<(), FepError> {
        channel.validate().map_err(FepError::config)?;
        binding.validate().map_err(FepError::config)?;
        binding.resolved_profile = self.profiles.get(&binding.profile_id).map(|p| p.clone());
        self.channels.insert(channel.id.clone(), channel);
        self.bindings.insert(binding.channel_id.clone(), binding);
        self.notify_subscribers();
        Ok(())
    }

    pub fn unregister_binding(&self, id: &ChannelId) -> bool {
        let removed = self.bindings.remove(id).is_some();
        if removed {
            self.notify_subscribers();
        }
        removed
    }

    /// Re-resolves every binding's profile pointer, used after a profile is
    /// added or removed so existing bindings pick up the change without a
    /// full reload.
    fn reresolve_bindings(&self) {
        for mut entry in self.bindings.iter_mut() {
            let profile_id = entry.profile_id.clone();
            entry.resolved_profile = self.profiles.get(&profile_id).map(|p| p.clone());
        }
    }

    pub fn get_profile(&self, id: &ProfileId) -> Option<ConnectionProfile> {
        self.profiles.get(id).map(|p| p.clone())
    }

    pub fn get_profile_required(&self, id: &ProfileId) -> Result<ConnectionProfile, FepError> {
        self.get_profile(id)
            .ok_or_else(|| FepError::config(format!("no connection profile registered for {id}")))
    }

    pub fn get_binding(&self, id: &ChannelId) -> Option<ChannelConnection> {
        self.bindings.get(id).map(|b| b.clone())
    }

    pub fn get_binding_required(&self, id: &ChannelId) -> Result<ChannelConnection, FepError> {
        self.get_binding(id)
            .ok_or_else(|| FepError::config(format!("no channel binding registered for {id}")))
    }

    pub fn get_channel(&self, id: &ChannelId) -> Option<Channel> {
        self.channels.get(id).map(|c| c.clone())
    }

    /// P3: active bindings sorted by priority ascending (lower is more
    /// preferred).
    pub fn list_active(&self) -> Vec<ChannelConnection> {
        let mut active: Vec<_> = self
            .bindings
            .iter()
            .filter(|e| e.active)
            .map(|e| e.clone())
            .collect();
        active.sort_by_key(|b| b.priority);
        active
    }

    /// P3: active channels sorted by priority ascending, joining the
    /// `Channel` metadata table against the active binding set.
    pub fn list_active_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self
            .bindings
            .iter()
            .filter(|e| e.active)
            .filter_map(|e| self.channels.get(&e.channel_id).map(|c| c.clone()))
            .collect();
        channels.sort_by_key(|c| c.priority);
        channels
    }

    pub fn list_by_profile(&self, profile_id: &ProfileId) -> Vec<ChannelConnection> {
        self.bindings
            .iter()
            .filter(|e| e.profile_id.as_str() == profile_id.as_str())
            .map(|e| e.clone())
            .collect()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.bindings.iter().map(|e| e.channel_id.clone()).collect()
    }

    pub fn profile_ids(&self) -> Vec<ProfileId> {
        self.profiles.iter().map(|e| e.profile_id.clone()).collect()
    }

    pub fn subscribe(self: &Arc<Self>, subscriber: Arc<dyn ConnectionsUpdated>) -> SubscriptionHandle {
        // Immediate-notification callback (§5: "runs synchronously on the
        // subscriber's thread") so a late joiner sees current state without
        // waiting for the next mutation.
        subscriber.on_update(&self.list_active(), &self.all_profiles());
        let id = self.subscribers.insert(subscriber);
        SubscriptionHandle::new(id, self.subscribers.clone())
    }

    fn all_profiles(&self) -> Vec<ConnectionProfile> {
        self.profiles.iter().map(|e| e.clone()).collect()
    }

    fn notify_subscribers(&self) {
        self.subscribers.notify_all(&self.list_active(), &self.all_profiles());
    }
}
