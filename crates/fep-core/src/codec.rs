//! The wire-codec boundary from §6: `encode`, `decode`, `correlation_key`.
//! Framing, the actual bit layout, and ISO 8583 field semantics are out of
//! scope — this trait exists purely so the transport layer can depend on a
//! codec without knowing its shape.
use crate::error::FepError;
use crate::ids::CorrelationKey;

/// A wire codec for some message type `M`. `fep-hosting` provides a
/// newline-delimited JSON implementation so the workspace is testable
/// end-to-end; production deployments would supply an ISO 8583 codec here
/// instead, unchanged at this trait boundary.
pub trait MessageCodec<M>: Send + Sync + 'static {
    fn encode(&self, message: &M) -> Result<Vec<u8>, FepError>;
    fn decode(&self, bytes: &[u8]) -> Result<M, FepError>;
    fn correlation_key(&self, message: &M) -> CorrelationKey;
}
