//! Persistence contracts and an in-memory store

use crate::types::{OrderBatch, PersistedRow};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Row columns that can be checked for prior occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoricalField {
    /// Client IP
    IpAddress,
    /// Normalized phone digits
    Phone,
}

impl HistoricalField {
    /// Column name in the persisted schema
    pub fn column(&self) -> &'static str {
        match self {
            HistoricalField::IpAddress => "ip_address",
            HistoricalField::Phone => "phone",
        }
    }

    fn value_of<'a>(&self, row: &'a PersistedRow) -> Option<&'a str> {
        match self {
            HistoricalField::IpAddress => row.ip_address.as_deref(),
            HistoricalField::Phone => row.phone.as_deref(),
        }
    }
}

/// Read side of the persisted-row collection
#[async_trait]
pub trait HistoricalSignals: Send + Sync {
    /// Has any stored row recorded exactly this value for the field
    async fn value_seen(&self, field: HistoricalField, value: &str) -> Result<bool>;

    /// Rows with `since <= recorded_at <= until`
    async fn rows_recorded_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u64>;
}

/// What a sink did with a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows newly written
    pub inserted: usize,
    /// Rows skipped because their identifier already existed
    pub already_present: usize,
}

impl InsertOutcome {
    /// Rows the sink accounted for
    pub fn accounted(&self) -> usize {
        self.inserted + self.already_present
    }
}

/// Write side of the persisted-row collection.
///
/// Implementations must treat `row_id` as a unique key: writing an existing
/// identifier is a no-op counted in `already_present`.
#[async_trait]
pub trait OrderSink: Send + Sync {
    /// Persist all rows of one order
    async fn insert_batch(&self, batch: &OrderBatch) -> Result<InsertOutcome>;
}

/// Process-local store keyed by row identifier
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderStore {
    rows: Arc<RwLock<HashMap<String, PersistedRow>>>,
    latency: Duration,
    fail_writes: bool,
}

impl MemoryOrderStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, for timeout tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject every write, for failure tests
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Number of stored rows
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// True when nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Stored row by identifier
    pub async fn get(&self, row_id: &str) -> Option<PersistedRow> {
        self.rows.read().await.get(row_id).cloned()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl HistoricalSignals for MemoryOrderStore {
    async fn value_seen(&self, field: HistoricalField, value: &str) -> Result<bool> {
        self.simulate_latency().await;
        let rows = self.rows.read().await;
        Ok(rows.values().any(|row| field.value_of(row) == Some(value)))
    }

    async fn rows_recorded_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u64> {
        self.simulate_latency().await;
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.recorded_at >= since && row.recorded_at <= until)
            .count() as u64)
    }
}

#[async_trait]
impl OrderSink for MemoryOrderStore {
    async fn insert_batch(&self, batch: &OrderBatch) -> Result<InsertOutcome> {
        self.simulate_latency().await;
        if self.fail_writes {
            return Err(Error::Persistence("store is read-only".to_string()));
        }

        let mut rows = self.rows.write().await;
        let mut outcome = InsertOutcome::default();
        for row in &batch.rows {
            if rows.contains_key(&row.row_id) {
                outcome.already_present += 1;
            } else {
                rows.insert(row.row_id.clone(), row.clone());
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }
}
