use super::{MemoryError, MemoryRecord, MemoryStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local store, used in tests and when no Redis URL is configured
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Vec<MemoryRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw record count for a symbol, superseded records included
    pub fn len(&self, symbol: &str) -> usize {
        self.records
            .read()
            .map(|map| map.get(&symbol.to_uppercase()).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let mut map = self
            .records
            .write()
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        map.entry(record.symbol.to_uppercase())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn history(&self, symbol: &str, max: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        let map = self
            .records
            .read()
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        let mut records = map.get(&symbol.to_uppercase()).cloned().unwrap_or_default();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        records.truncate(max);
        Ok(records)
    }
}
