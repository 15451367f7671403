//! The configuration-source boundary from §6: a JSON/YAML document in one of
//! two top-level shapes, with only the v2 fields the registry actually
//! consumes; everything else is ignored silently.
use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::FepError;
use crate::model::{Channel, ChannelConnection, ConnectionProfile};

/// v1 shape: `{channels, schemaOverrides, defaults}` — schema-mapping only,
/// no connection profiles. The registry accepts it but delegates to a
/// schema-only view (no bindings are resolvable from a v1 document).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigDocumentV1 {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default, rename = "schemaOverrides")]
    pub schema_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// v2 shape: `{version: "2.x", connectionProfiles: {id -> profile}, channels:
/// {id -> binding}}`. The only shape that can populate profiles and bindings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigDocumentV2 {
    pub version: String,
    #[serde(default, rename = "connectionProfiles")]
    pub connection_profiles: BTreeMap<String, ConnectionProfile>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConnectionDoc>,
}

/// A v2 channel entry combines the [`Channel`] shape and the
/// [`ChannelConnection`] binding shape — the source format nests both under
/// one key per channel id.
///
/// The binding-level `active`/`schema_overrides`/`properties` are distinct
/// from the flattened `Channel`'s own fields of the same name (a channel can
/// be defined active while this particular binding is temporarily disabled,
/// or carry per-binding overrides layered on top of the channel's own) — so
/// they are serialized under a `binding_*` prefix to avoid colliding with the
/// flattened keys during deserialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConnectionDoc {
    #[serde(flatten)]
    pub channel: Channel,
    pub profile_id: String,
    #[serde(default, rename = "binding_schema_overrides")]
    pub schema_overrides: BTreeMap<String, String>,
    #[serde(default, rename = "binding_properties")]
    pub properties: BTreeMap<String, String>,
    #[serde(default = "model_default_true", rename = "binding_active")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

/// The parsed document, format-detected by the presence of a top-level
/// `version` field starting with `"2"`.
#[derive(Clone, Debug)]
pub enum ConfigDocument {
    V1(ConfigDocumentV1),
    V2(ConfigDocumentV2),
}

impl ConfigDocument {
    /// Parses either JSON or YAML bytes and detects v1 vs v2 by probing for
    /// a `version` field, per §6.
    pub fn parse(bytes: &[u8]) -> Result<Self, FepError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .or_else(|_| serde_yaml::from_slice::<serde_json::Value>(bytes).map_err(|e| {
                serde_json::Error::io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }))
            .map_err(|e| FepError::config(format!("configuration document is not valid JSON/YAML: {e}")))?;

        let is_v2 = value
            .get("version")
            .and_then(|v| v.as_str())
            .is_some_and(|v| v.starts_with('2'));

        if is_v2 {
            let doc: ConfigDocumentV2 = serde_json::from_value(value)
                .map_err(|e| FepError::config(format!("invalid v2 configuration document: {e}")))?;
            Ok(ConfigDocument::V2(doc))
        } else {
            let doc: ConfigDocumentV1 = serde_json::from_value(value)
                .map_err(|e| FepError::config(format!("invalid v1 configuration document: {e}")))?;
            Ok(ConfigDocument::V1(doc))
        }
    }
}

/// Converts a parsed v2 channel entry into the runtime [`ChannelConnection`]
/// shape (the profile pointer is resolved separately by the registry).
pub fn binding_from_doc(id: &str, doc: &ChannelConnectionDoc) -> ChannelConnection {
    ChannelConnection {
        channel_id: id.into(),
        profile_id: doc.profile_id.clone().into(),
        schema_overrides: doc.schema_overrides.clone(),
        properties: doc.properties.clone(),
        active: doc.active,
        priority: doc.channel.priority,
        description: doc.description.clone(),
        resolved_profile: None,
    }
}

/// A source of configuration documents the registry can load from and poll
/// for hot-reload.
pub trait ConfigSource: Send + Sync + 'static {
    /// Reads and returns the current document bytes.
    fn load(&self) -> Result<Vec<u8>, FepError>;

    /// `true` if the source has changed since `since` — used by the
    /// hot-reload watcher's fixed-interval poll (§4.1, default 5s).
    fn modified_since(&self, since: Instant) -> bool;
}

/// An in-memory source, primarily for tests: `set` replaces the document and
/// bumps the modification marker so `modified_since` reports a change.
pub struct StaticConfigSource {
    inner: std::sync::RwLock<StaticInner>,
}

struct StaticInner {
    bytes: Vec<u8>,
    last_modified: Instant,
}

impl StaticConfigSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: std::sync::RwLock::new(StaticInner {
                bytes,
                last_modified: Instant::now(),
            }),
        }
    }

    pub fn set(&self, bytes: Vec<u8>) {
        let mut guard = self.inner.write().unwrap();
        guard.bytes = bytes;
        guard.last_modified = Instant::now();
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<Vec<u8>, FepError> {
        Ok(self.inner.read().unwrap().bytes.clone())
    }

    fn modified_since(&self, since: Instant) -> bool {
        self.inner.read().unwrap().last_modified > since
    }
}

/// A file-backed source: `load` re-reads the file, `modified_since` compares
/// the file's mtime. Deliberately simple (§9: "a timestamp-poll is
/// sufficient; do not require OS-level file-watch APIs").
pub struct FileConfigSource {
    path: std::path::PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<Vec<u8>, FepError> {
        std::fs::read(&self.path)
            .map_err(|e| FepError::config(format!("failed to read {}: {e}", self.path.display())))
    }

    fn modified_since(&self, since: Instant) -> bool {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        let now = std::time::SystemTime::now();
        let Ok(age) = now.duration_since(modified) else {
            return true;
        };
        // `since` is a monotonic Instant while `modified` is a SystemTime; we
        // approximate by checking whether the file changed more recently than
        // "now - elapsed since `since`".
        Instant::now().saturating_duration_since(since) >= age
    }
}

fn model_default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_v1_document_by_absent_version() {
        let json = br#"{"channels": [], "schemaOverrides": {}, "defaults": {}}"#;
        let doc = ConfigDocument::parse(json).unwrap();
        assert!(matches!(doc, ConfigDocument::V1(_)));
    }

    #[test]
    fn detects_v2_document_by_version_prefix() {
        let json = br#"{
            "version": "2.1",
            "connectionProfiles": {},
            "channels": {}
        }"#;
        let doc = ConfigDocument::parse(json).unwrap();
        assert!(matches!(doc, ConfigDocument::V2(_)));
    }

    #[test]
    fn v2_round_trips_connection_profile_fields_l1() {
        let json = br#"{
            "version": "2.0",
            "connectionProfiles": {
                "CBS_PRIMARY": {
                    "profile_id": "CBS_PRIMARY",
                    "host": "10.0.0.5",
                    "send_port": 6000,
                    "receive_port": 6001,
                    "connect_timeout_ms": 1000,
                    "response_timeout_ms": 2000,
                    "heartbeat_interval_ms": 5000,
                    "keepalive_interval_ms": 5000,
                    "retry_delay_ms": 500,
                    "max_retries": 5,
                    "tls": false,
                    "pool_size": 2,
                    "auto_reconnect": true,
                    "server_mode": false,
                    "properties": {}
                }
            },
            "channels": {}
        }"#;
        let ConfigDocument::V2(doc) = ConfigDocument::parse(json).unwrap() else {
            panic!("expected v2 document");
        };
        let profile = doc.connection_profiles.get("CBS_PRIMARY").unwrap();
        assert_eq!(profile.host, "10.0.0.5");
        assert_eq!(profile.send_port, 6000);
        assert_eq!(profile.receive_port, Some(6001));
        assert!(profile.is_dual_channel());
        assert_eq!(profile.max_retries, 5);
        assert_eq!(profile.pool_size, 2);
    }

    #[test]
    fn malformed_document_fails_fast() {
        let bytes = b"not json and not yaml: [[[";
        assert!(ConfigDocument::parse(bytes).is_err());
    }
}
