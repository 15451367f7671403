//! Immutable-after-build processor registry (§4.8): a `HashMap<TransactionType,
//! Arc<dyn Processor>>` assembled once at startup via [`ProcessorRegistryBuilder`]
//! and never mutated afterward — the teacher corpus's general preference for
//! "build once, read forever" over a runtime-mutable table.
use std::collections::HashMap;
use std::sync::Arc;

use fep_core::model::TransactionType;

use crate::processor::Processor;

#[derive(Default)]
pub struct ProcessorRegistryBuilder {
    processors: HashMap<TransactionType, Arc<dyn Processor>>,
}

impl ProcessorRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, transaction_type: TransactionType, processor: Arc<dyn Processor>) -> Self {
        self.processors.insert(transaction_type, processor);
        self
    }

    pub fn build(self) -> ProcessorRegistry {
        ProcessorRegistry {
            processors: self.processors,
        }
    }
}

pub struct ProcessorRegistry {
    processors: HashMap<TransactionType, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn get(&self, transaction_type: &TransactionType) -> Option<Arc<dyn Processor>> {
        self.processors.get(transaction_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
