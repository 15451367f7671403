//! Stable, cross-crate error type and the response-code taxonomy from the
//! error handling design.
//!
//! # Why
//! Every layer of the system — connection, timeout, business validation — can
//! fail for reasons the caller needs to classify automatically (retry? surface
//! as a `96`? fail fast at an admin boundary?). Rather than one enum per crate
//! with ad-hoc conversions at every boundary, the whole workspace shares one
//! error shape: a stable `code`, a human-readable `message`, an optional
//! source, and an [`ErrorCategory`] driving automated handling.
//!
//! # How
//! [`FepError`] is constructed with [`FepError::new`] and enriched with
//! `with_cause`/`with_category` builder methods, mirroring the pattern used
//! throughout this codebase for builder-style value construction.
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// Broad classification of a [`FepError`], used by callers to decide whether
/// to retry, reconnect, fail fast, or surface a `96` to the far end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid or missing configuration entities. Never swallowed; always
    /// propagated to the caller of `load()` or a runtime `register`.
    Config,
    /// Connection-layer faults: not connected, peer closed, TLS handshake,
    /// backpressure. Recovered locally via reconnect where the profile
    /// permits it.
    Connection,
    /// Timeout-manager faults: request timeout, heartbeat lost. Always
    /// surfaced; the timeout manager guarantees at most one expiration
    /// callback per transaction.
    Timeout,
    /// Protocol-layer faults: duplicate correlation key, decode failure.
    /// Surfaced to the caller; the connection itself is not torn down unless
    /// the codec reports the failure as unrecoverable.
    Protocol,
    /// Business declines (invalid card, limit exceeded, duplicate
    /// transaction, ...). Handled as clean declines inside the pipeline —
    /// never kills a connection.
    Transaction,
    /// Anything unexpected escaping a handler or processor. Converted to a
    /// `96` response and logged with full context.
    System,
}

/// Stable error code constants aligned with ISO 8583 response-code
/// conventions, used both as [`FepError`] codes and as the `response_code`
/// carried on a declined [`crate::model::TransactionResponse`].
pub mod codes {
    pub const APPROVED: &str = "00";
    pub const INVALID_CARD: &str = "14";
    pub const EXPIRED_CARD: &str = "54";
    pub const TRANSACTION_NOT_PERMITTED: &str = "57";
    pub const EXCEEDS_WITHDRAWAL_LIMIT: &str = "61";
    pub const DUPLICATE_TRANSACTION: &str = "94";
    pub const SYSTEM_MALFUNCTION: &str = "96";
    pub const INVALID_AMOUNT: &str = "13";
    pub const PIN_REQUIRED: &str = "55";
    pub const UNKNOWN_ACCOUNT: &str = "03";
    pub const REQUEST_TIMEOUT: &str = "68";
}

/// The shared error type returned from fallible operations throughout the
/// workspace.
///
/// # Contract
/// - `code` is a stable `'static` string — callers may match on it.
/// - `message` is for humans; never include sensitive data (PAN, PIN block).
/// - `cause`, when present, is reachable through [`std::error::Error::source`].
#[derive(Debug)]
pub struct FepError {
    code: &'static str,
    message: Cow<'static, str>,
    category: ErrorCategory,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl FepError {
    pub fn new(
        code: &'static str,
        category: ErrorCategory,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            category,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }
}

impl fmt::Display for FepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for FepError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

/// Convenience constructors for the connection-layer error reasons named in
/// `spec.md` §4.2/§7: `NOT_CONNECTED`, `PEER_CLOSED`, `TLS_HANDSHAKE`,
/// `BACKPRESSURE`, `DUPLICATE_CORRELATION`, `TIMEOUT`, `CANCELLED`.
impl FepError {
    pub fn not_connected(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new("connection.not_connected", ErrorCategory::Connection, detail)
    }

    pub fn peer_closed(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new("connection.peer_closed", ErrorCategory::Connection, detail)
    }

    pub fn backpressure(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new("connection.backpressure", ErrorCategory::Connection, detail)
    }

    pub fn duplicate_correlation(key: impl fmt::Display) -> Self {
        Self::new(
            "protocol.duplicate_correlation",
            ErrorCategory::Protocol,
            format!("correlation key already pending: {key}"),
        )
    }

    pub fn request_timeout(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new("timeout.request_timeout", ErrorCategory::Timeout, detail)
    }

    pub fn cancelled(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new("connection.cancelled", ErrorCategory::Connection, detail)
    }

    pub fn config(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new("config.invalid", ErrorCategory::Config, detail)
    }

    pub fn system(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::SYSTEM_MALFUNCTION, ErrorCategory::System, detail)
    }
}

/// A business decline carrying the response code the pipeline will echo back
/// to the caller. Distinct from [`FepError`] because a `TransactionError` is
/// never an unexpected failure — it is the normal, typed outcome of a
/// validator or processor declining a request (§4.7: "a handler throwing a
/// typed transaction exception is treated as a clean decline").
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason} ({response_code})")]
pub struct TransactionError {
    pub response_code: &'static str,
    pub reason: String,
}

impl TransactionError {
    pub fn new(response_code: &'static str, reason: impl Into<String>) -> Self {
        Self {
            response_code,
            reason: reason.into(),
        }
    }

    pub fn invalid_card(reason: impl Into<String>) -> Self {
        Self::new(codes::INVALID_CARD, reason)
    }

    pub fn expired_card() -> Self {
        Self::new(codes::EXPIRED_CARD, "card expiration date has passed")
    }

    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        Self::new(codes::INVALID_AMOUNT, reason)
    }

    pub fn pin_required() -> Self {
        Self::new(codes::PIN_REQUIRED, "pin block required for this transaction type")
    }

    pub fn limit_exceeded(reason: impl Into<String>) -> Self {
        Self::new(codes::EXCEEDS_WITHDRAWAL_LIMIT, reason)
    }

    pub fn duplicate_transaction() -> Self {
        Self::new(codes::DUPLICATE_TRANSACTION, "duplicate transaction fingerprint")
    }

    pub fn unsupported_transaction_type() -> Self {
        Self::new(codes::TRANSACTION_NOT_PERMITTED, "transaction type is not routable")
    }

    pub fn unknown_account() -> Self {
        Self::new(codes::UNKNOWN_ACCOUNT, "unknown channel or account")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = FepError::not_connected("socket reset");
        let rendered = err.to_string();
        assert!(rendered.contains("connection.not_connected"));
        assert!(rendered.contains("socket reset"));
    }

    #[test]
    fn transaction_error_carries_iso_style_code() {
        let err = TransactionError::limit_exceeded("daily cap reached");
        assert_eq!(err.response_code, codes::EXCEEDS_WITHDRAWAL_LIMIT);
    }

    #[test]
    fn source_chain_is_reachable() {
        use std::io;
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err = FepError::system("wrapped io failure").with_cause(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
