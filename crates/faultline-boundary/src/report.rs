// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hand-off point for external error tracking.

use faultline_error::AppError;
use std::sync::{Arc, Mutex};

/// Receives classified errors that passed
/// [`should_report_error`](faultline_error::should_report_error).
pub trait ErrorReporter: Send + Sync {
    /// Sink name for diagnostics.
    fn name(&self) -> &str;

    /// Forward one error. Must not block for long; queue internally if the
    /// tracker is remote.
    fn report(&self, error: &AppError);
}

/// Keeps reported errors in memory.
#[derive(Clone, Default)]
pub struct MemoryReporter {
    reported: Arc<Mutex<Vec<AppError>>>,
}

impl MemoryReporter {
    /// Empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn reported(&self) -> Vec<AppError> {
        self.reported
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of reported errors.
    pub fn len(&self) -> usize {
        self.reported.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorReporter for MemoryReporter {
    fn name(&self) -> &str {
        "memory"
    }

    fn report(&self, error: &AppError) {
        if let Ok(mut guard) = self.reported.lock() {
            guard.push(error.clone());
        }
    }
}
