//! Table Client Module
//!
//! Owns the connection lifecycle around a `TableStore` and gates every
//! operation on it being connected.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{BatchOperation, RowFields, RowRef, TableRow, TableStore, UpsertMode};
use crate::error::{CacheError, Result};

// == Table Client ==
/// Shared handle to the backing table store.
///
/// `connect()` is idempotent: concurrent callers wait on the same in-flight
/// table creation instead of issuing their own. `disconnect()` swaps in a fresh
/// connection slot, so a later `connect()` starts over.
pub struct TableClient {
    store: Arc<dyn TableStore>,
    connection: Mutex<Arc<OnceCell<()>>>,
}

impl TableClient {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            connection: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    // == Connection Lifecycle ==
    /// Connects to the store, creating the table if needed.
    pub async fn connect(&self) -> Result<()> {
        let slot = self.connection.lock().clone();
        slot.get_or_try_init(|| async {
            debug!("connecting to table store");
            self.store.ensure_table().await?;
            info!("table store connected");
            Ok::<(), CacheError>(())
        })
        .await?;
        Ok(())
    }

    /// Drops the connection. Safe to call when not connected.
    pub fn disconnect(&self) {
        let mut slot = self.connection.lock();
        if slot.initialized() {
            debug!("table store disconnected");
        }
        *slot = Arc::new(OnceCell::new());
    }

    pub fn is_ready(&self) -> bool {
        self.connection.lock().initialized()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CacheError::NotStarted)
        }
    }

    // == Row Operations ==
    /// Fetches a row, `None` when it does not exist.
    pub async fn get(&self, segment: &str, id: &str) -> Result<Option<TableRow>> {
        self.ensure_connected()?;
        match self.store.get_entity(segment, id).await {
            Ok(row) => Ok(Some(row)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Merge-upserts the supplied columns.
    pub async fn upsert(&self, segment: &str, id: &str, fields: RowFields) -> Result<()> {
        self.ensure_connected()?;
        self.store
            .upsert_entity(segment, id, fields, UpsertMode::Merge)
            .await
    }

    /// Deletes a row. Returns false if it was already gone.
    pub async fn delete(&self, segment: &str, id: &str) -> Result<bool> {
        self.ensure_connected()?;
        match self.store.delete_entity(segment, id).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// One page of expired, sweep-eligible rows.
    pub async fn query_expired(&self, now_ms: i64, page_size: usize) -> Result<Vec<RowRef>> {
        self.ensure_connected()?;
        self.store.query_expired(now_ms, page_size).await
    }

    /// Submits a partition-scoped batch.
    pub async fn execute_batch(
        &self,
        segment: &str,
        operations: Vec<BatchOperation>,
    ) -> Result<usize> {
        self.ensure_connected()?;
        self.store.submit_batch(segment, operations).await
    }

    /// Deletes the whole table. Does not require a connection.
    pub async fn delete_table(&self) -> Result<()> {
        self.disconnect();
        self.store.delete_table().await
    }
}

impl std::fmt::Debug for TableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableClient")
            .field("ready", &self.is_ready())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTableStore, StoreOperation};
    use std::time::Duration;

    #[tokio::test]
    async fn test_not_started_before_connect() {
        let client = TableClient::new(Arc::new(MemoryTableStore::new("unittest")));

        assert!(!client.is_ready());
        let err = client.get("s", "1").await.unwrap_err();
        assert!(matches!(err, CacheError::NotStarted));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let store = Arc::new(MemoryTableStore::new("unittest"));
        let client = TableClient::new(store.clone());

        client.connect().await.unwrap();
        client.connect().await.unwrap();

        assert!(client.is_ready());
        assert_eq!(store.ensure_table_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_connect_shares_attempt() {
        let store =
            Arc::new(MemoryTableStore::new("unittest").with_latency(Duration::from_millis(30)));
        let client = Arc::new(TableClient::new(store.clone()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.connect().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.ensure_table_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_can_be_retried() {
        let store = Arc::new(MemoryTableStore::new("unittest"));
        store.fail_next(
            StoreOperation::EnsureTable,
            CacheError::backend(503, "ServerBusy", "busy"),
        );
        let client = TableClient::new(store.clone());

        assert!(client.connect().await.is_err());
        assert!(!client.is_ready());

        client.connect().await.unwrap();
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn test_disconnect_resets_readiness() {
        let store = Arc::new(MemoryTableStore::new("unittest"));
        let client = TableClient::new(store.clone());

        client.disconnect();
        client.connect().await.unwrap();
        client.disconnect();

        assert!(!client.is_ready());
        client.connect().await.unwrap();
        assert_eq!(store.ensure_table_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_row_returns_false() {
        let client = TableClient::new(Arc::new(MemoryTableStore::new("unittest")));
        client.connect().await.unwrap();

        assert!(!client.delete("s", "1").await.unwrap());
        assert!(client.get("s", "1").await.unwrap().is_none());
    }
}
