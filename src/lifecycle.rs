//! Lifecycle Module
//!
//! `TableCache` composes the cache client and the optional sweeper behind the
//! start/stop/ready surface a host caching framework drives.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::cache::{self, CacheClient, CacheEnvelope, CacheKey, CacheStats, SharedStats};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, TtlInterval};
use crate::error::Result;
use crate::store::{self, TableClient, TableStore};
use crate::tasks::Sweeper;

// == Table Cache ==
/// Cache adapter over a partitioned table store.
///
/// Owns the shared table client, the request-path cache client and, when
/// `ttl_interval` is not disabled, the eviction sweeper.
#[derive(Debug)]
pub struct TableCache {
    config: Config,
    table: Arc<TableClient>,
    client: CacheClient,
    sweeper: Option<Sweeper>,
    stats: SharedStats,
}

impl TableCache {
    // == Constructors ==
    /// Creates a cache over `store` using the system clock.
    pub fn new(config: Config, store: Arc<dyn TableStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Creates a cache over `store` reading time from `clock`.
    pub fn with_clock(config: Config, store: Arc<dyn TableStore>, clock: Arc<dyn Clock>) -> Self {
        let table = Arc::new(TableClient::new(store));
        let stats = CacheStats::shared();
        let client = CacheClient::new(table.clone(), clock.clone(), stats.clone());
        let sweeper = match config.ttl_interval {
            TtlInterval::Every(interval) => Some(Sweeper::new(
                table.clone(),
                clock,
                stats.clone(),
                interval,
            )),
            TtlInterval::Disabled => None,
        };

        Self {
            config,
            table,
            client,
            sweeper,
            stats,
        }
    }

    /// Creates a cache over the store named by `config.connection`.
    pub fn from_config(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = store::open_store(&config, clock.clone())?;
        Ok(Self::with_clock(config, store, clock))
    }

    // == Lifecycle ==
    /// Connects the store if needed, then arms the sweeper if one is configured.
    ///
    /// Idempotent. Also re-arms a sweeper that stopped after a fatal failure.
    pub async fn start(&self) -> Result<()> {
        self.table.connect().await?;
        if let Some(sweeper) = &self.sweeper {
            sweeper.start();
        }
        info!(partition = %self.config.partition, "table cache started");
        Ok(())
    }

    /// Stops the sweeper and disconnects the store. Safe when never started.
    pub fn stop(&self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.stop();
        }
        self.table.disconnect();
    }

    /// True when the store is connected and the sweeper, if any, is armed.
    pub fn is_ready(&self) -> bool {
        self.table.is_ready()
            && self
                .sweeper
                .as_ref()
                .map_or(true, |sweeper| sweeper.is_ready())
    }

    // == Cache Operations ==
    pub async fn get<T>(&self, key: &CacheKey) -> Result<Option<CacheEnvelope<T>>>
    where
        T: DeserializeOwned,
    {
        self.client.get(key).await
    }

    /// Writes an entry. It is sweep-eligible whenever a sweeper is configured.
    pub async fn set<T>(&self, key: &CacheKey, value: &T, ttl_ms: u64) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.client
            .set(key, value, ttl_ms, self.sweeper.is_some())
            .await
    }

    pub async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.client.remove(key).await
    }

    pub fn validate_segment_name(&self, name: &str) -> Result<()> {
        cache::validate_segment_name(name)
    }

    // == Accessors ==
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    /// The sweeper, `None` when sweeping is disabled.
    pub fn sweeper(&self) -> Option<&Sweeper> {
        self.sweeper.as_ref()
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}
