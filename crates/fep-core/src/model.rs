//! The shared data model from `spec.md` §3: channels, connection profiles,
//! bindings, connection/server state machines, and the transaction
//! request/response records that flow through the pipeline.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, ProfileId, TerminalId, TransactionId};

/// Channel type, as enumerated in §3. Kept as a closed enum (rather than a
/// free string) because the registry's priority-sort and the manager's
/// client/server split both branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelType {
    Atm,
    Pos,
    Interbank,
    Cbs,
    Mobile,
    Api,
    Batch,
}

/// A logical endpoint a request arrives on or leaves via.
///
/// Invariant (enforced by [`crate::error`] callers, not by the type itself):
/// `id` is non-empty and `priority >= 1`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub display_name: String,
    pub channel_type: ChannelType,
    pub vendor: String,
    pub version: String,
    pub active: bool,
    pub default_request_schema: Option<String>,
    pub default_response_schema: Option<String>,
    #[serde(default)]
    pub schema_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub priority: u32,
}

impl Channel {
    /// Basic shape invariants from §3: non-empty id, non-empty type string
    /// equivalent (always true for the closed enum, kept for symmetry with
    /// `priority`), priority at least 1.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("channel id must not be empty".into());
        }
        if self.priority < 1 {
            return Err(format!("channel {} priority must be >= 1", self.id));
        }
        Ok(())
    }
}

/// Reusable physical transport settings, shared by any number of channels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub profile_id: ProfileId,
    pub host: String,
    pub send_port: u16,
    /// `<= 0` in the source format means "dual = false"; represented here as
    /// `None`, with [`Self::effective_receive_port`] doing the substitution.
    pub receive_port: Option<u16>,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub keepalive_interval_ms: u64,
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub server_mode: bool,
    /// Bound on the outbound send queue (§5: "send queues are bounded,
    /// configurable, default 1024"). Enqueuing beyond this blocks up to
    /// `connect_timeout_ms` and then fails with `BACKPRESSURE`.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_pool_size() -> u32 {
    1
}

fn default_send_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

impl ConnectionProfile {
    /// `true` iff the receive port differs from the send port — a dedicated
    /// receive socket is required.
    pub fn is_dual_channel(&self) -> bool {
        self.receive_port.is_some_and(|p| p != self.send_port)
    }

    /// The port the receive loop actually binds/connects to: `receive_port`
    /// when set, else `send_port`.
    pub fn effective_receive_port(&self) -> u16 {
        self.receive_port.unwrap_or(self.send_port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.profile_id.is_empty() {
            return Err("profile id must not be empty".into());
        }
        if self.send_port == 0 {
            return Err(format!("profile {} send_port must be in 1..65535", self.profile_id));
        }
        if let Some(p) = self.receive_port {
            if p == 0 {
                return Err(format!("profile {} receive_port must be in 1..65535", self.profile_id));
            }
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("response_timeout_ms", self.response_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("keepalive_interval_ms", self.keepalive_interval_ms),
            ("retry_delay_ms", self.retry_delay_ms),
        ] {
            if value == 0 {
                return Err(format!("profile {} {name} must be > 0", self.profile_id));
            }
        }
        Ok(())
    }
}

/// Binding between a [`Channel`] and a [`ConnectionProfile`], plus per-binding
/// overrides. `resolved_profile` is populated by the registry after load and
/// is `None` only transiently (never for an active binding post-load).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConnection {
    pub channel_id: ChannelId,
    pub profile_id: ProfileId,
    #[serde(default)]
    pub schema_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub description: String,
    #[serde(skip)]
    pub resolved_profile: Option<ConnectionProfile>,
}

fn default_priority() -> u32 {
    100
}

impl ChannelConnection {
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_id.is_empty() {
            return Err("binding channel id must not be empty".into());
        }
        if self.profile_id.is_empty() {
            return Err("binding profile id must not be empty".into());
        }
        Ok(())
    }

    /// Cascaded property lookup: local override, then channel-level, then
    /// profile-level — the first hit wins, as described in §3.
    pub fn property<'a>(
        &'a self,
        channel: &'a Channel,
        key: &str,
    ) -> Option<&'a str> {
        self.properties
            .get(key)
            .or_else(|| channel.properties.get(key))
            .or_else(|| self.resolved_profile.as_ref().and_then(|p| p.properties.get(key)))
            .map(|s| s.as_str())
    }
}

/// C2's client state machine (§3): `Disconnected -> Connecting -> Connected ->
/// SigningOn -> SignedOn -> {Reconnecting|Disconnecting|Failed}`. A client is
/// operational only in `SignedOn`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    SigningOn,
    SignedOn,
    Reconnecting,
    Disconnecting,
    Failed,
}

impl ConnectionState {
    /// The legal transition set from §3, used both to drive the state
    /// machine and to assert P2 (no forbidden transition is ever produced).
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Reconnecting)
                | (Connected, SigningOn)
                | (Connected, Reconnecting)
                | (Connected, Failed)
                | (SigningOn, SignedOn)
                | (SigningOn, Reconnecting)
                | (SigningOn, Failed)
                | (SignedOn, Reconnecting)
                | (SignedOn, Disconnecting)
                | (SignedOn, Failed)
                | (Reconnecting, Connecting)
                | (Reconnecting, Failed)
                | (Reconnecting, Disconnecting)
                | (Disconnecting, Disconnected)
                | (Failed, Connecting)
                | (Failed, Disconnecting)
        )
    }

    pub fn is_operational(self) -> bool {
        matches!(self, ConnectionState::SignedOn)
    }
}

/// C3's listener lifecycle (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ServerState {
    pub fn can_transition_to(self, next: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
                | (Failed, Starting)
        )
    }
}

/// Closed set of transaction types the pipeline and processor router branch
/// on. `Other` is the escape hatch for an MTI the registry doesn't yet know
/// about — it still routes (and is correctly declined as
/// `TRANSACTION_NOT_PERMITTED` when unrouted) instead of failing to parse.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Withdrawal,
    Transfer,
    BillPayment,
    BalanceInquiry,
    FundsInquiry,
    Reversal,
    ScheduledTransfer,
    Other(String),
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Withdrawal => write!(f, "WITHDRAWAL"),
            TransactionType::Transfer => write!(f, "TRANSFER"),
            TransactionType::BillPayment => write!(f, "BILL_PAYMENT"),
            TransactionType::BalanceInquiry => write!(f, "BALANCE_INQUIRY"),
            TransactionType::FundsInquiry => write!(f, "FUNDS_INQUIRY"),
            TransactionType::Reversal => write!(f, "REVERSAL"),
            TransactionType::ScheduledTransfer => write!(f, "SCHEDULED_TRANSFER"),
            TransactionType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Type-specific request extensions named in §3 (e-ticket card, QR data,
/// SWIFT beneficiary) modeled as a closed enum so `TransactionRequest` stays
/// one concrete, movable-by-value type instead of a trait object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum Extensions {
    #[default]
    None,
    ETicketCard {
        card_serial: String,
    },
    Qr {
        qr_payload: String,
    },
    SwiftBeneficiary {
        iban: String,
        bic: String,
        beneficiary_name: String,
    },
}

/// Money as minor-unit integer amount plus currency code — never floating
/// point, so limit and balance arithmetic stays exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: i64,
    pub currency: [u8; 3],
}

impl Money {
    pub fn new(minor_units: i64, currency: &str) -> Self {
        let bytes = currency.as_bytes();
        let mut code = [0u8; 3];
        let len = bytes.len().min(3);
        code[..len].copy_from_slice(&bytes[..len]);
        Self {
            minor_units,
            currency: code,
        }
    }

    pub fn currency_str(&self) -> String {
        String::from_utf8_lossy(&self.currency).trim_end_matches('\0').to_string()
    }

    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }
}

/// The request record carried through the pipeline. Fields mirror §3
/// verbatim; `masked_pan` is what gets logged, `pan` never is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub transaction_id: TransactionId,
    pub transaction_type: TransactionType,
    pub processing_code: String,
    pub pan: String,
    pub expiry: Option<String>,
    pub amount: Money,
    pub source_account: Option<String>,
    pub destination_account: Option<String>,
    pub terminal_id: TerminalId,
    pub rrn: String,
    pub stan: String,
    pub pin_block: Option<String>,
    pub acquiring_bank_code: Option<String>,
    pub channel_name: ChannelId,
    pub customer_id: Option<crate::ids::CustomerId>,
    /// Set only on `Reversal` requests: the transaction id being reversed.
    pub original_transaction_id: Option<TransactionId>,
    #[serde(default)]
    pub extensions: Extensions,
}

impl TransactionRequest {
    pub fn masked_pan(&self) -> String {
        mask_pan(&self.pan)
    }
}

/// Masks all but the first 6 and last 4 digits of a PAN, the conventional
/// card-masking boundary.
pub fn mask_pan(pan: &str) -> String {
    let len = pan.len();
    if len <= 10 {
        return "*".repeat(len);
    }
    let (head, rest) = pan.split_at(6);
    let (middle, tail) = rest.split_at(rest.len() - 4);
    format!("{head}{}{tail}", "*".repeat(middle.len()))
}

/// The response record carried back out through the pipeline and onto the
/// originating socket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: TransactionId,
    pub response_code: &'static str,
    pub approved: bool,
    pub authorization_code: Option<String>,
    pub rrn: String,
    pub stan: String,
    pub processing_time_ms: u64,
    pub description: String,
}

impl TransactionResponse {
    pub fn decline(
        transaction_id: TransactionId,
        rrn: impl Into<String>,
        stan: impl Into<String>,
        response_code: &'static str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            response_code,
            approved: false,
            authorization_code: None,
            rrn: rrn.into(),
            stan: stan.into(),
            processing_time_ms: 0,
            description: description.into(),
        }
    }

    pub fn approve(
        transaction_id: TransactionId,
        rrn: impl Into<String>,
        stan: impl Into<String>,
        authorization_code: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            response_code: crate::error::codes::APPROVED,
            approved: true,
            authorization_code: Some(authorization_code.into()),
            rrn: rrn.into(),
            stan: stan.into(),
            processing_time_ms: 0,
            description: "approved".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_pan_keeps_first_six_and_last_four() {
        assert_eq!(mask_pan("4111111111111111"), "411111*******1111");
    }

    #[test]
    fn mask_pan_short_pan_is_fully_masked() {
        assert_eq!(mask_pan("123456"), "******");
    }

    #[test]
    fn connection_profile_dual_channel_detection() {
        let mut profile = sample_profile();
        assert!(!profile.is_dual_channel());
        profile.receive_port = Some(6001);
        assert!(profile.is_dual_channel());
        assert_eq!(profile.effective_receive_port(), 6001);
    }

    #[test]
    fn connection_profile_rejects_zero_timeouts() {
        let mut profile = sample_profile();
        profile.heartbeat_interval_ms = 0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn channel_rejects_priority_below_one() {
        let mut channel = sample_channel();
        channel.priority = 0;
        assert!(channel.validate().is_err());
    }

    #[test]
    fn state_machine_rejects_illegal_jump() {
        assert!(!ConnectionState::Disconnected.can_transition_to(ConnectionState::SignedOn));
        assert!(ConnectionState::Disconnected.can_transition_to(ConnectionState::Connecting));
    }

    fn sample_profile() -> ConnectionProfile {
        ConnectionProfile {
            profile_id: "CBS_PRIMARY".into(),
            host: "127.0.0.1".into(),
            send_port: 6000,
            receive_port: None,
            connect_timeout_ms: 1000,
            response_timeout_ms: 2000,
            heartbeat_interval_ms: 5000,
            keepalive_interval_ms: 5000,
            retry_delay_ms: 500,
            max_retries: 5,
            tls: false,
            pool_size: 1,
            auto_reconnect: true,
            server_mode: false,
            send_queue_capacity: 1024,
            properties: Default::default(),
        }
    }

    fn sample_channel() -> Channel {
        Channel {
            id: "ATM_NCR_V1".into(),
            display_name: "NCR ATM v1".into(),
            channel_type: ChannelType::Atm,
            vendor: "NCR".into(),
            version: "1".into(),
            active: true,
            default_request_schema: None,
            default_response_schema: None,
            schema_overrides: Default::default(),
            properties: Default::default(),
            tags: Default::default(),
            priority: 10,
        }
    }
}
