//! Store Module
//!
//! The operation set the cache needs from a partitioned table store, the row
//! types exchanged with it, and the connection-owning `TableClient`.

mod memory;
mod table_client;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CacheError, Result};

pub use memory::{MemoryTableStore, StoreOperation};
pub use table_client::TableClient;

// == Public Constants ==
/// Largest batch the store accepts, and the page size used by sweep queries.
pub const MAX_BATCH_OPERATIONS: usize = 100;

// == Row Fields ==
/// Writable columns of a cache row.
///
/// `None` means "not supplied": a merge upsert leaves that column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFields {
    /// Serialized payload
    pub item: Option<String>,
    /// Caller-supplied lifetime in milliseconds
    pub ttl_ms: Option<u64>,
    /// Absolute expiry, epoch milliseconds
    pub expire_at_ms: Option<i64>,
    /// Whether the sweeper may reclaim the row
    pub sweep_eligible: Option<bool>,
}

impl RowFields {
    /// Applies every supplied column onto `target`.
    pub fn merge_into(self, target: &mut RowFields) {
        if let Some(item) = self.item {
            target.item = Some(item);
        }
        if let Some(ttl_ms) = self.ttl_ms {
            target.ttl_ms = Some(ttl_ms);
        }
        if let Some(expire_at_ms) = self.expire_at_ms {
            target.expire_at_ms = Some(expire_at_ms);
        }
        if let Some(sweep_eligible) = self.sweep_eligible {
            target.sweep_eligible = Some(sweep_eligible);
        }
    }

    /// True if the row matches the sweep filter at `now_ms`.
    pub fn is_sweepable(&self, now_ms: i64) -> bool {
        self.sweep_eligible == Some(true)
            && matches!(self.expire_at_ms, Some(expire_at) if expire_at < now_ms)
    }
}

// == Table Row ==
/// A persisted row as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Partition key
    pub segment: String,
    /// Row key
    pub id: String,
    /// Store-assigned write timestamp
    pub stored_at: DateTime<Utc>,
    pub fields: RowFields,
}

/// Address of a row: partition key plus row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowRef {
    pub segment: String,
    pub id: String,
}

impl RowRef {
    pub fn new(segment: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            id: id.into(),
        }
    }
}

/// How an upsert treats an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Supplied columns overwrite, others are kept
    Merge,
    /// The row is replaced wholesale
    Replace,
}

/// One operation inside a partition-scoped batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Delete(RowRef),
}

impl BatchOperation {
    pub fn segment(&self) -> &str {
        match self {
            BatchOperation::Delete(row) => &row.segment,
        }
    }
}

// == Table Store Trait ==
/// Operational contract of the backing table store.
///
/// Implementations must tolerate concurrent use from the cache client and the
/// sweeper through a shared handle.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Creates the table if it does not exist yet.
    async fn ensure_table(&self) -> Result<()>;

    async fn delete_table(&self) -> Result<()>;

    /// Fetches one row; fails with `CacheError::NotFound` when absent.
    async fn get_entity(&self, segment: &str, id: &str) -> Result<TableRow>;

    async fn upsert_entity(
        &self,
        segment: &str,
        id: &str,
        fields: RowFields,
        mode: UpsertMode,
    ) -> Result<()>;

    /// Deletes one row; fails with `CacheError::NotFound` when absent.
    async fn delete_entity(&self, segment: &str, id: &str) -> Result<()>;

    /// Returns at most `page_size` rows with `sweep_eligible == true` and
    /// `expire_at_ms < now_ms`, in no particular order.
    async fn query_expired(&self, now_ms: i64, page_size: usize) -> Result<Vec<RowRef>>;

    /// Executes a batch atomically. Every operation must target `segment`
    /// and the batch may hold at most `MAX_BATCH_OPERATIONS` operations.
    /// Returns the number of rows deleted.
    async fn submit_batch(&self, segment: &str, operations: Vec<BatchOperation>) -> Result<usize>;
}

// == Store Factory ==
/// Opens the store named by `config.connection`.
///
/// Only the in-process `memory://` scheme is built in; other stores are
/// plugged in by constructing a `TableStore` directly.
pub fn open_store(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn TableStore>> {
    if config.connection.starts_with("memory://") {
        Ok(Arc::new(MemoryTableStore::with_clock(
            config.partition.clone(),
            clock,
        )))
    } else {
        Err(CacheError::Configuration(format!(
            "unsupported connection {:?}",
            config.connection
        )))
    }
}
