//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is started.
//!
//! # Tasks
//! - Eviction Sweeper: deletes expired, sweep-eligible rows at a configured interval

mod batch;
mod observers;
mod sweeper;

pub use batch::SweepBatch;
pub use observers::{CollectedHandler, ErrorHandler};
pub use sweeper::{SweepTimer, Sweeper, SweeperState, SWEEP_PAGE_SIZE};
