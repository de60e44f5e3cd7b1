//! In-memory table store
//!
//! Reference implementation of `TableStore`. Rows live in a single ordered map
//! keyed by (segment, id) behind one lock, which makes every batch atomic.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::{
    BatchOperation, RowFields, RowRef, TableRow, TableStore, UpsertMode, MAX_BATCH_OPERATIONS,
};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    EnsureTable,
    Get,
    Upsert,
    Delete,
    Query,
    Batch,
}

#[derive(Debug, Clone)]
struct StoredRow {
    stored_at: DateTime<Utc>,
    fields: RowFields,
}

#[derive(Debug, Default)]
struct Table {
    exists: bool,
    rows: BTreeMap<(String, String), StoredRow>,
}

// == Memory Table Store ==
/// Table store kept entirely in process memory.
#[derive(Debug)]
pub struct MemoryTableStore {
    name: String,
    clock: Arc<dyn Clock>,
    table: Mutex<Table>,
    faults: Mutex<HashMap<StoreOperation, VecDeque<Option<CacheError>>>>,
    latency: Duration,
    ensure_table_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MemoryTableStore {
    // == Constructor ==
    /// Creates an empty store for table `name` using the system clock.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, Arc::new(SystemClock))
    }

    /// Creates an empty store whose write timestamps come from `clock`.
    pub fn with_clock(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
            table: Mutex::new(Table::default()),
            faults: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            ensure_table_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Delays every operation by `latency`, simulating a network round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Fault Injection ==
    /// Makes the next call of `operation` fail with `error`.
    ///
    /// Queued faults are consumed one per call, in order.
    pub fn fail_next(&self, operation: StoreOperation, error: CacheError) {
        self.fail_after(operation, 0, error);
    }

    /// Lets `skip` further calls of `operation` through, then fails one with `error`.
    pub fn fail_after(&self, operation: StoreOperation, skip: usize, error: CacheError) {
        let mut faults = self.faults.lock();
        let queue = faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_with(|| None).take(skip));
        queue.push_back(Some(error));
    }

    // == Inspection ==
    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.table.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rows stored under `segment`.
    pub fn segment_len(&self, segment: &str) -> usize {
        self.table
            .lock()
            .rows
            .keys()
            .filter(|(s, _)| s == segment)
            .count()
    }

    /// How many times the table creation call reached the store.
    pub fn ensure_table_calls(&self) -> usize {
        self.ensure_table_calls.load(Ordering::SeqCst)
    }

    /// How many batches were submitted, accepted or not.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    async fn round_trip(&self, operation: StoreOperation) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.faults.lock().get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn table_not_found(&self) -> CacheError {
        CacheError::backend(
            404,
            "TableNotFound",
            format!("The table '{}' does not exist", self.name),
        )
    }

    /// Partition and row keys may not carry `/`, `\\`, `#`, `?` or control characters.
    fn check_key(segment: &str, id: &str) -> Result<()> {
        let restricted = |c: char| matches!(c, '/' | '\\' | '#' | '?') || c.is_control();
        for (column, value) in [("PartitionKey", segment), ("RowKey", id)] {
            if value.contains(restricted) {
                return Err(CacheError::backend(
                    400,
                    "InvalidInput",
                    format!(
                        "{column} \"{}\" contains a restricted character",
                        value.escape_debug()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.clock.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn ensure_table(&self) -> Result<()> {
        self.ensure_table_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip(StoreOperation::EnsureTable).await?;
        let mut table = self.table.lock();
        if !table.exists {
            debug!(table = %self.name, "creating table");
            table.exists = true;
        }
        Ok(())
    }

    async fn delete_table(&self) -> Result<()> {
        let mut table = self.table.lock();
        if !table.exists {
            return Err(self.table_not_found());
        }
        table.exists = false;
        table.rows.clear();
        Ok(())
    }

    async fn get_entity(&self, segment: &str, id: &str) -> Result<TableRow> {
        self.round_trip(StoreOperation::Get).await?;
        Self::check_key(segment, id)?;
        let table = self.table.lock();
        if !table.exists {
            return Err(self.table_not_found());
        }
        table
            .rows
            .get(&(segment.to_string(), id.to_string()))
            .map(|row| TableRow {
                segment: segment.to_string(),
                id: id.to_string(),
                stored_at: row.stored_at,
                fields: row.fields.clone(),
            })
            .ok_or_else(|| CacheError::NotFound {
                segment: segment.to_string(),
                id: id.to_string(),
            })
    }

    async fn upsert_entity(
        &self,
        segment: &str,
        id: &str,
        fields: RowFields,
        mode: UpsertMode,
    ) -> Result<()> {
        self.round_trip(StoreOperation::Upsert).await?;
        Self::check_key(segment, id)?;
        let stored_at = self.now();
        let mut table = self.table.lock();
        if !table.exists {
            return Err(self.table_not_found());
        }
        let row = table
            .rows
            .entry((segment.to_string(), id.to_string()))
            .or_insert_with(|| StoredRow {
                stored_at,
                fields: RowFields::default(),
            });
        row.stored_at = stored_at;
        match mode {
            UpsertMode::Merge => fields.merge_into(&mut row.fields),
            UpsertMode::Replace => row.fields = fields,
        }
        Ok(())
    }

    async fn delete_entity(&self, segment: &str, id: &str) -> Result<()> {
        self.round_trip(StoreOperation::Delete).await?;
        Self::check_key(segment, id)?;
        let mut table = self.table.lock();
        if !table.exists {
            return Err(self.table_not_found());
        }
        table
            .rows
            .remove(&(segment.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| CacheError::NotFound {
                segment: segment.to_string(),
                id: id.to_string(),
            })
    }

    async fn query_expired(&self, now_ms: i64, page_size: usize) -> Result<Vec<RowRef>> {
        self.round_trip(StoreOperation::Query).await?;
        let table = self.table.lock();
        if !table.exists {
            return Err(self.table_not_found());
        }
        Ok(table
            .rows
            .iter()
            .filter(|(_, row)| row.fields.is_sweepable(now_ms))
            .take(page_size)
            .map(|((segment, id), _)| RowRef::new(segment.clone(), id.clone()))
            .collect())
    }

    async fn submit_batch(&self, segment: &str, operations: Vec<BatchOperation>) -> Result<usize> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip(StoreOperation::Batch).await?;

        if operations.is_empty() {
            return Err(CacheError::BatchRejected {
                segment: segment.to_string(),
                reason: "batch contains no operations".to_string(),
            });
        }
        if operations.len() > MAX_BATCH_OPERATIONS {
            return Err(CacheError::BatchRejected {
                segment: segment.to_string(),
                reason: format!(
                    "batch of {} operations exceeds the limit of {}",
                    operations.len(),
                    MAX_BATCH_OPERATIONS
                ),
            });
        }
        if let Some(foreign) = operations.iter().find(|op| op.segment() != segment) {
            return Err(CacheError::BatchRejected {
                segment: segment.to_string(),
                reason: format!("operation targets foreign partition \"{}\"", foreign.segment()),
            });
        }

        let mut table = self.table.lock();
        if !table.exists {
            return Err(self.table_not_found());
        }
        // rows dropped concurrently are skipped, not failed
        let deleted = operations
            .into_iter()
            .filter(|op| match op {
                BatchOperation::Delete(row) => table
                    .rows
                    .remove(&(row.segment.clone(), row.id.clone()))
                    .is_some(),
            })
            .count();
        Ok(deleted)
    }
}
