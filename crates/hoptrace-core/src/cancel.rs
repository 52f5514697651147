//! Cooperative cancellation for a running sweep.

use crate::TracerouteError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag the sweep checks before every probe.
///
/// Clones share the same state, so one clone can be handed to a signal
/// handler or another thread while the sweep holds the other.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the sweep stop before its next probe.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns `Err(TracerouteError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), TracerouteError> {
        if self.is_cancelled() {
            return Err(TracerouteError::Cancelled);
        }
        Ok(())
    }
}
