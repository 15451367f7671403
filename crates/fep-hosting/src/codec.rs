//! `LineJsonCodec` — a newline-delimited JSON stand-in for the out-of-scope
//! ISO 8583 bit-level codec (§6). Exists purely so the workspace is
//! self-contained and testable end-to-end; production would swap this
//! implementation for a real one at the same `MessageCodec` boundary.
use fep_core::codec::MessageCodec;
use fep_core::error::FepError;
use fep_core::ids::CorrelationKey;
use fep_core::model::{TransactionRequest, TransactionResponse};

#[derive(Default, Clone, Copy)]
pub struct LineJsonCodec;

impl MessageCodec<TransactionRequest> for LineJsonCodec {
    fn encode(&self, message: &TransactionRequest) -> Result<Vec<u8>, FepError> {
        encode_line(message)
    }

    fn decode(&self, bytes: &[u8]) -> Result<TransactionRequest, FepError> {
        decode_line(bytes)
    }

    fn correlation_key(&self, message: &TransactionRequest) -> CorrelationKey {
        CorrelationKey::new(format!("{}|{}", message.rrn, message.stan))
    }
}

impl MessageCodec<TransactionResponse> for LineJsonCodec {
    fn encode(&self, message: &TransactionResponse) -> Result<Vec<u8>, FepError> {
        encode_line(message)
    }

    fn decode(&self, bytes: &[u8]) -> Result<TransactionResponse, FepError> {
        decode_line(bytes)
    }

    fn correlation_key(&self, message: &TransactionResponse) -> CorrelationKey {
        CorrelationKey::new(format!("{}|{}", message.rrn, message.stan))
    }
}

fn encode_line<M: serde::Serialize>(message: &M) -> Result<Vec<u8>, FepError> {
    let mut bytes = serde_json::to_vec(message).map_err(|e| FepError::system(format!("line-json encode failed: {e}")).with_cause(e))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn decode_line<M: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<M, FepError> {
    let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    serde_json::from_slice(trimmed).map_err(|e| FepError::system(format!("line-json decode failed: {e}")).with_cause(e))
}
