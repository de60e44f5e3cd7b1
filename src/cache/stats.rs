//! Cache Statistics Module
//!
//! Tracks request-path and sweep-path counters.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Statistics shared between the cache client and the sweeper.
pub type SharedStats = Arc<Mutex<CacheStats>>;

// == Cache Stats ==
/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that returned an entry
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
    /// Successful writes
    pub sets: u64,
    /// Drop calls, including drops of absent keys
    pub drops: u64,
    /// Sweep ticks that completed
    pub sweeps: u64,
    /// Entries deleted by the sweeper
    pub swept: u64,
    /// Sweep ticks that failed
    pub sweep_errors: u64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStats {
        Arc::new(Mutex::new(Self::new()))
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_drop(&mut self) {
        self.drops += 1;
    }

    // == Sweep Counters ==
    /// Records a completed sweep tick that deleted `deleted` entries.
    pub fn record_sweep(&mut self, deleted: usize) {
        self.sweeps += 1;
        self.swept += deleted as u64;
    }

    pub fn record_sweep_error(&mut self) {
        self.sweep_errors += 1;
    }
}
