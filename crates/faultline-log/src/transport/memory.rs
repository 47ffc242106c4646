// SPDX-License-Identifier: MIT OR Apache-2.0
use super::{Transport, TransportError};
use crate::entry::LogEntry;
use crate::level::Level;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Keeps every entry in memory. Clones share the same buffer, so a test can
/// hold one handle while the logger owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries at exactly `level`.
    pub fn at_level(&self, level: Level) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<LogEntry> {
        self.lock().last().cloned()
    }

    /// Number of captured entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every captured entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), TransportError> {
        self.lock().push(entry.clone());
        Ok(())
    }
}
