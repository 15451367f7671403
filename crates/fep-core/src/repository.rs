//! The persistence boundary from §6: an opaque transaction repository with
//! at-least-once `save` semantics. The core treats storage as a black box;
//! `fep-hosting` supplies the assumed in-memory implementation.
use async_trait::async_trait;

use crate::error::FepError;
use crate::ids::TransactionId;
use crate::model::TransactionResponse;

/// A persisted record: the response plus a status the repository tracks
/// independently of the pipeline (e.g. for reconciliation against FISC).
#[derive(Clone, Debug)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub rrn: String,
    pub status: TransactionStatus,
    pub response: TransactionResponse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Declined,
    Reversed,
}

/// The persistence contract named in §6. Implementations only need
/// at-least-once `save` — the pipeline does not depend on stronger
/// guarantees.
#[async_trait]
pub trait TransactionRepository: Send + Sync + 'static {
    async fn save(&self, record: TransactionRecord) -> Result<(), FepError>;
    async fn find_by_id(&self, id: TransactionId) -> Result<Option<TransactionRecord>, FepError>;
    async fn find_by_rrn(&self, rrn: &str) -> Result<Option<TransactionRecord>, FepError>;
    async fn find_by_status(
        &self,
        status: TransactionStatus,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, FepError>;
    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), FepError>;
}
