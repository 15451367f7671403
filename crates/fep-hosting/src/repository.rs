//! In-memory `TransactionRepository` (§6: "an in-memory repository is
//! assumed"). Backed by `DashMap`s keyed both by transaction id and by RRN so
//! `find_by_rrn` doesn't require a full scan on the hot path.
use dashmap::DashMap;
use fep_core::error::FepError;
use fep_core::ids::TransactionId;
use fep_core::repository::{TransactionRecord, TransactionRepository, TransactionStatus};

#[derive(Default)]
pub struct InMemoryRepository {
    by_id: DashMap<TransactionId, TransactionRecord>,
    rrn_index: DashMap<String, TransactionId>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TransactionRepository for InMemoryRepository {
    async fn save(&self, record: TransactionRecord) -> Result<(), FepError> {
        self.rrn_index.insert(record.rrn.clone(), record.transaction_id);
        self.by_id.insert(record.transaction_id, record);
        Ok(())
    }

    async fn find_by_id(&self, id: TransactionId) -> Result<Option<TransactionRecord>, FepError> {
        Ok(self.by_id.get(&id).map(|r| r.clone()))
    }

    async fn find_by_rrn(&self, rrn: &str) -> Result<Option<TransactionRecord>, FepError> {
        let Some(id) = self.rrn_index.get(rrn).map(|id| *id) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn find_by_status(&self, status: TransactionStatus, limit: usize) -> Result<Vec<TransactionRecord>, FepError> {
        Ok(self
            .by_id
            .iter()
            .filter(|entry| entry.status == status)
            .take(limit)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn update_status(&self, id: TransactionId, status: TransactionStatus) -> Result<(), FepError> {
        match self.by_id.get_mut(&id) {
            Some(mut record) => {
                record.status = status;
                Ok(())
            }
            None => Err(FepError::system(format!("update_status: unknown transaction id {id}"))),
        }
    }
}
