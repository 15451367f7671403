//! Newtype identifiers shared across every FEP component.
//!
//! Why: passing bare `String`/`Uuid` around lets a channel id and a profile id
//! collide at a call site with no compiler help. Every cross-component id in
//! this codebase is a distinct newtype instead, at the cost of a little
//! boilerplate `From`/`Display` wiring below.

use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(ChannelId, "Unique identifier of a logical [`crate::model::Channel`].");
string_id!(ProfileId, "Unique identifier of a [`crate::model::ConnectionProfile`].");
string_id!(CustomerId, "Identifier of the customer a transaction is attributed to.");
string_id!(TerminalId, "Identifier of the originating physical terminal.");
string_id!(ScheduleId, "Identifier of a scheduled-transfer record.");

/// Identifier of a single transaction, generated once per request and carried
/// through the pipeline, the timeout manager, and (when approved) the
/// repository and limit-usage ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Correlation key derived from a message's identifying fields (STAN, RRN, or
/// a codec-specific message id) and used to pair a request with its eventual
/// response on a single dual-channel connection. Two in-flight sends must
/// never share a key — `fep-transport-tcp` rejects the second with
/// `DUPLICATE_CORRELATION` rather than overwrite the first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
