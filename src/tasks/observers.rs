//! Sweep observers
//!
//! Callback registry for the `collected` and `error` signals of the sweep loop.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::{CacheError, Result, SweepError};

/// Called with the deleted count after each successful collect.
///
/// An error returned here, or a panic, is treated as a fatal tick failure.
pub type CollectedHandler = Arc<dyn Fn(usize) -> anyhow::Result<()> + Send + Sync>;

/// Called with every tick failure, transient or fatal.
pub type ErrorHandler = Arc<dyn Fn(&SweepError) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Observers {
    collected: RwLock<Vec<CollectedHandler>>,
    errors: RwLock<Vec<ErrorHandler>>,
}

impl Observers {
    pub(crate) fn on_collected(&self, handler: CollectedHandler) {
        self.collected.write().push(handler);
    }

    pub(crate) fn on_error(&self, handler: ErrorHandler) {
        self.errors.write().push(handler);
    }

    /// Runs collected handlers in registration order, stopping at the first failure.
    ///
    /// A panicking handler is caught and reported as `CacheError::Handler`.
    pub(crate) fn emit_collected(&self, deleted: usize) -> Result<()> {
        // snapshot so handlers may register further handlers
        let handlers = self.collected.read().clone();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(deleted))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(CacheError::Handler(format!("{err:#}"))),
                Err(payload) => return Err(CacheError::Handler(panic_message(payload))),
            }
        }
        Ok(())
    }

    /// Runs every error handler; a panicking handler is logged and skipped.
    pub(crate) fn emit_error(&self, err: &SweepError) {
        let handlers = self.errors.read().clone();
        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(err))) {
                warn!(panic = %panic_message(payload), "sweep error handler panicked");
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("handler panicked: {detail}")
}
