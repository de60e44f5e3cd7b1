//! Table Cache - a cache adapter over a partitioned table store
//!
//! Stores JSON values with a per-entry TTL and runs a background sweeper that
//! deletes expired entries in partition-scoped batches.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEnvelope, CacheKey, CacheStats};
pub use config::{Config, TtlInterval};
pub use error::{CacheError, Result, SweepError};
pub use lifecycle::TableCache;
pub use tasks::{Sweeper, SweeperState};
