//! Record sinks

use async_trait::async_trait;
use collect_core_types::CollectError;
use parking_lot::Mutex;

use crate::model::ItemRecord;

/// Where collected records go. The orchestrator only emits; formatting
/// and storage are the sink's concern.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&self, record: &ItemRecord) -> Result<(), CollectError>;
}

/// Buffers records in memory. The default for tests and embedding.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ItemRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ItemRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn emit(&self, record: &ItemRecord) -> Result<(), CollectError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
