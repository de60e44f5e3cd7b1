//! Eviction Sweeper
//!
//! Background task that periodically deletes expired, sweep-eligible rows.
//!
//! The loop sleeps for the configured interval, runs one tick, and only then
//! arms the next sleep, so ticks driven by the loop never overlap. `collect()`
//! itself is serialized as well, so manual calls and the loop never race.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::batch::SweepBatch;
use super::observers::Observers;
use crate::cache::SharedStats;
use crate::clock::Clock;
use crate::error::{Result, SweepError};
use crate::store::{TableClient, MAX_BATCH_OPERATIONS};

/// Rows requested from the store per sweep tick.
pub const SWEEP_PAGE_SIZE: usize = MAX_BATCH_OPERATIONS;

// == Sweeper State ==
/// Observable phase of the sweep loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperState {
    /// No timer armed
    Stopped,
    /// Timer armed, waiting for the next tick
    Scheduled,
    /// Timer armed, a collect is running
    Collecting,
}

// == Sweep Timer ==
/// Handle of an armed sweep loop.
///
/// Returned by `Sweeper::start()`; starting an already armed sweeper hands
/// back the same handle.
#[derive(Debug, Default)]
pub struct SweepTimer {
    cancelled: AtomicBool,
    wake: Notify,
}

impl SweepTimer {
    pub fn is_armed(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // stores a permit if the loop is not currently waiting
        self.wake.notify_one();
    }
}

struct SweeperInner {
    table: Arc<TableClient>,
    clock: Arc<dyn Clock>,
    stats: SharedStats,
    interval: Duration,
    collecting: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    timer: Mutex<Option<Arc<SweepTimer>>>,
    observers: Observers,
}

enum TickOutcome {
    Reschedule,
    Stop,
}

// == Sweeper ==
/// Timer-driven eviction engine.
///
/// Cloning yields another handle to the same sweeper.
#[derive(Clone)]
pub struct Sweeper {
    inner: Arc<SweeperInner>,
}

impl Sweeper {
    // == Constructor ==
    /// Creates a stopped sweeper that ticks every `interval` once started.
    pub fn new(
        table: Arc<TableClient>,
        clock: Arc<dyn Clock>,
        stats: SharedStats,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SweeperInner {
                table,
                clock,
                stats,
                interval,
                collecting: tokio::sync::Mutex::new(()),
                in_flight: AtomicBool::new(false),
                timer: Mutex::new(None),
                observers: Observers::default(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    // == Start ==
    /// Arms the sweep loop.
    ///
    /// Idempotent: if a timer is already armed its handle is returned unchanged.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Arc<SweepTimer> {
        let mut slot = self.inner.timer.lock();
        if let Some(timer) = slot.as_ref().filter(|timer| timer.is_armed()) {
            return timer.clone();
        }

        let timer = Arc::new(SweepTimer::default());
        *slot = Some(timer.clone());
        tokio::spawn(SweeperInner::run(self.inner.clone(), timer.clone()));

        info!(interval_ms = self.inner.interval.as_millis() as u64, "sweeper started");
        timer
    }

    // == Stop ==
    /// Cancels the armed timer. A tick already collecting runs to completion
    /// but is not followed by another one. No-op when stopped.
    pub fn stop(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.cancel();
            info!("sweeper stopped");
        }
    }

    /// True while a timer is armed.
    pub fn is_ready(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|timer| timer.is_armed())
    }

    pub fn state(&self) -> SweeperState {
        if !self.is_ready() {
            SweeperState::Stopped
        } else if self.inner.in_flight.load(Ordering::SeqCst) {
            SweeperState::Collecting
        } else {
            SweeperState::Scheduled
        }
    }

    // == Collect ==
    /// Runs one sweep: deletes up to one page of expired, sweep-eligible rows,
    /// emits `collected` and returns how many were deleted.
    ///
    /// Partition batches run one after another. If one fails the error is
    /// returned and batches already applied stay applied. A failing
    /// `collected` handler is returned as `CacheError::Handler`.
    pub async fn collect(&self) -> Result<usize> {
        self.inner.collect_and_emit().await
    }

    // == Observers ==
    /// Registers a handler for the `collected` signal, raised after every
    /// successful collect, whether run by the loop or called directly.
    ///
    /// A handler error or panic is a fatal tick failure: it is reported through the
    /// `error` signal and the loop stops.
    pub fn on_collected<F>(&self, handler: F)
    where
        F: Fn(usize) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.observers.on_collected(Arc::new(handler));
    }

    /// Registers a handler for the `error` signal of loop ticks.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&SweepError) + Send + Sync + 'static,
    {
        self.inner.observers.on_error(Arc::new(handler));
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("interval", &self.inner.interval)
            .field("state", &self.state())
            .finish()
    }
}

impl SweeperInner {
    /// Emits outside the collect lock so handlers may call back into the sweeper.
    async fn collect_and_emit(&self) -> Result<usize> {
        let deleted = self.collect().await?;
        self.observers.emit_collected(deleted)?;
        Ok(deleted)
    }

    async fn collect(&self) -> Result<usize> {
        let _guard = self.collecting.lock().await;
        self.in_flight.store(true, Ordering::SeqCst);
        let result = self.sweep_page().await;
        self.in_flight.store(false, Ordering::SeqCst);

        match &result {
            Ok(0) => {
                debug!("sweep found no expired entries");
                self.stats.lock().record_sweep(0);
            }
            Ok(deleted) => {
                info!(deleted = *deleted, "sweep removed expired entries");
                self.stats.lock().record_sweep(*deleted);
            }
            Err(_) => self.stats.lock().record_sweep_error(),
        }
        result
    }

    async fn sweep_page(&self) -> Result<usize> {
        let now_ms = self.clock.now_ms();
        let expired = self.table.query_expired(now_ms, SWEEP_PAGE_SIZE).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        // one batch in flight at a time, across all partitions
        for batch in SweepBatch::partition(expired) {
            let segment = batch.segment().to_string();
            let size = batch.len();
            let removed = self
                .table
                .execute_batch(&segment, batch.into_operations())
                .await?;
            debug!(segment = %segment, size, removed, "sweep batch applied");
            deleted += removed;
        }
        Ok(deleted)
    }

    async fn run(self: Arc<Self>, timer: Arc<SweepTimer>) {
        // covers unwinding and runtime shutdown as well as a fatal tick
        let _disarm = DisarmOnExit {
            inner: self.clone(),
            timer: timer.clone(),
        };

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = timer.wake.notified() => {}
            }
            if !timer.is_armed() {
                break;
            }

            if let TickOutcome::Stop = self.tick().await {
                break;
            }
            if !timer.is_armed() {
                break;
            }
        }
        debug!("sweep loop exited");
    }

    async fn tick(&self) -> TickOutcome {
        let Err(err) = self.collect_and_emit().await else {
            return TickOutcome::Reschedule;
        };

        let err = SweepError::classify(err);
        if err.is_fatal() {
            error!(error = %err, "sweep failed, stopping sweeper");
        } else {
            warn!(error = %err, "sweep failed, retrying next interval");
        }
        self.observers.emit_error(&err);

        if err.is_fatal() {
            TickOutcome::Stop
        } else {
            TickOutcome::Reschedule
        }
    }

    /// Clears the slot if it still holds `timer`; a newer timer is left alone.
    fn disarm(&self, timer: &Arc<SweepTimer>) {
        let mut slot = self.timer.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, timer)) {
            *slot = None;
        }
        timer.cancel();
    }
}

/// Disarms the loop's timer when the loop task ends for any reason.
struct DisarmOnExit {
    inner: Arc<SweeperInner>,
    timer: Arc<SweepTimer>,
}

impl Drop for DisarmOnExit {
    fn drop(&mut self) {
        self.inner.disarm(&self.timer);
    }
}
