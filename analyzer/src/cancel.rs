//! Cooperative cancellation for a run.
//!
//! The token is checked before every file and every attempt. In-flight agent
//! processes are not killed here; they finish or die with the terminal's
//! signal, and their output is only persisted after a clean success.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            warn!("cancellation requested; no new attempts will start");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token on SIGINT/SIGTERM. Call at most once per process.
    pub fn install_signal_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || token.cancel()).context("install signal handler")
    }
}
