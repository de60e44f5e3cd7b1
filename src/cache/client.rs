//! Cache Client Module
//!
//! get/set/drop on top of the entity codec and the table client.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::codec::{self, CacheEnvelope};
use super::key::CacheKey;
use super::stats::SharedStats;
use crate::clock::Clock;
use crate::error::Result;
use crate::store::TableClient;

// == Cache Client ==
/// Request-path cache operations.
#[derive(Debug, Clone)]
pub struct CacheClient {
    table: Arc<TableClient>,
    clock: Arc<dyn Clock>,
    stats: SharedStats,
}

impl CacheClient {
    pub fn new(table: Arc<TableClient>, clock: Arc<dyn Clock>, stats: SharedStats) -> Self {
        Self {
            table,
            clock,
            stats,
        }
    }

    /// The shared table client.
    pub fn table(&self) -> &Arc<TableClient> {
        &self.table
    }

    // == Get ==
    /// Reads an entry.
    ///
    /// Returns `Ok(None)` when the key is absent. An undecodable row fails with
    /// `CorruptRecord`; other store failures propagate unchanged.
    pub async fn get<T>(&self, key: &CacheKey) -> Result<Option<CacheEnvelope<T>>>
    where
        T: DeserializeOwned,
    {
        let Some(row) = self.table.get(&key.segment, &key.id).await? else {
            self.stats.lock().record_miss();
            return Ok(None);
        };

        let envelope = codec::decode(&row)?;
        self.stats.lock().record_hit();
        Ok(Some(envelope))
    }

    // == Set ==
    /// Writes an entry with a lifetime of `ttl_ms`.
    ///
    /// Encoding happens before any store call, so a value that fails to
    /// serialize leaves the store untouched.
    pub async fn set<T>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl_ms: u64,
        sweep_eligible: bool,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let fields = codec::encode(value, ttl_ms, sweep_eligible, self.clock.now_ms())?;
        self.table.upsert(&key.segment, &key.id, fields).await?;

        debug!(segment = %key.segment, id = %key.id, ttl_ms, sweep_eligible, "cache entry set");
        self.stats.lock().record_set();
        Ok(())
    }

    // == Remove ==
    /// Removes an entry. Removing an absent entry also succeeds.
    pub async fn remove(&self, key: &CacheKey) -> Result<()> {
        let existed = self.table.delete(&key.segment, &key.id).await?;

        debug!(segment = %key.segment, id = %key.id, existed, "cache entry removed");
        self.stats.lock().record_drop();
        Ok(())
    }
}
