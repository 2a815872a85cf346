//! Append-only log of past analyses, read back to enrich new prompts.
//!
//! Records are never rewritten. Recording an observed outcome appends a new
//! record that supersedes the original; readers hide superseded records.

pub mod in_memory;
pub mod redis_store;

pub use in_memory::InMemoryStore;
pub use redis_store::RedisMemoryStore;

use crate::models::AnalysisResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("memory backend error: {0}")]
    Backend(String),

    #[error("memory record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Price movement observed some time after an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedOutcome {
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub symbol: String,
    pub module: String,
    /// When the analysis was produced
    pub timestamp: DateTime<Utc>,
    /// When this record was appended
    pub recorded_at: DateTime<Utc>,
    pub summary: String,
    pub reference_price: f64,
    pub outcome: Option<ObservedOutcome>,
    pub supersedes: Option<Uuid>,
}

impl MemoryRecord {
    pub fn from_result(result: &AnalysisResult, summary_chars: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: result.symbol.clone(),
            module: result.module.clone(),
            timestamp: result.timestamp,
            recorded_at: Utc::now(),
            summary: result.memory_summary(summary_chars),
            reference_price: result.price,
            outcome: None,
            supersedes: None,
        }
    }

    /// New record carrying the observed outcome and superseding `self`
    pub fn with_outcome(&self, price: f64, observed_at: DateTime<Utc>) -> Self {
        let change_pct = if self.reference_price != 0.0 {
            (price - self.reference_price) / self.reference_price * 100.0
        } else {
            0.0
        };

        Self {
            id: Uuid::new_v4(),
            recorded_at: observed_at,
            outcome: Some(ObservedOutcome {
                observed_at,
                price,
                change_pct,
            }),
            supersedes: Some(self.id),
            ..self.clone()
        }
    }
}

/// Storage backend for memory records
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError>;

    /// Up to `max` raw records for `symbol`, most recently recorded first,
    /// superseded ones included
    async fn history(&self, symbol: &str, max: usize) -> Result<Vec<MemoryRecord>, MemoryError>;
}

/// Hide records that a later record supersedes; input is most recent first
fn visible(records: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
    let superseded: HashSet<Uuid> = records.iter().filter_map(|r| r.supersedes).collect();
    records
        .into_iter()
        .filter(|r| !superseded.contains(&r.id))
        .collect()
}

/// Pipeline-facing memory: never blocks the caller, never fails it
#[derive(Clone)]
pub struct Memory {
    store: Arc<dyn MemoryStore>,
    summary_chars: usize,
}

impl Memory {
    pub fn new(store: Arc<dyn MemoryStore>, summary_chars: usize) -> Self {
        Self {
            store,
            summary_chars,
        }
    }

    /// Append a record for `result` in the background
    pub fn record(&self, result: &AnalysisResult) -> JoinHandle<()> {
        let record = MemoryRecord::from_result(result, self.summary_chars);
        let store = self.store.clone();

        tokio::spawn(async move {
            match store.append(&record).await {
                Ok(()) => tracing::debug!(symbol = %record.symbol, id = %record.id, "Analysis recorded"),
                Err(e) => tracing::warn!(symbol = %record.symbol, error = %e, "Failed to record analysis"),
            }
        })
    }

    /// Prior analyses for prompt enrichment, most recent first. Empty when
    /// there is no history or the store is unreachable.
    pub async fn recent_context_for(&self, symbol: &str, limit: usize) -> Vec<MemoryRecord> {
        if limit == 0 {
            return Vec::new();
        }

        // Superseded originals are filtered out after the read
        match self.store.history(symbol, limit.saturating_mul(4) + 8).await {
            Ok(records) => {
                let mut records = visible(records);
                records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                records.truncate(limit);
                records
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Memory unavailable, continuing without history");
                Vec::new()
            }
        }
    }

    /// Attach observed outcomes to analyses older than `min_age` that have
    /// none yet. Returns how many records were appended.
    pub async fn train(&self, symbol: &str, current_price: f64, min_age: Duration) -> usize {
        let records = match self.store.history(symbol, 500).await {
            Ok(records) => visible(records),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Memory unavailable, nothing to train");
                return 0;
            }
        };

        let now = Utc::now();
        let mut appended = 0;
        for record in records
            .iter()
            .filter(|r| r.outcome.is_none() && now - r.timestamp >= min_age)
        {
            let updated = record.with_outcome(current_price, now);
            match self.store.append(&updated).await {
                Ok(()) => appended += 1,
                Err(e) => {
                    tracing::warn!(symbol, id = %record.id, error = %e, "Failed to store outcome");
                }
            }
        }

        tracing::info!(symbol, appended, "Memory outcomes recorded");
        appended
    }
}
