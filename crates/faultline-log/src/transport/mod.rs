// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable sinks for finished log entries.
//!
//! A [`Transport`] receives entries that are already serialized and redacted.
//! `write` is synchronous and must not block for long; sinks that do real
//! I/O can be wrapped in a [`QueuedTransport`] so callers never wait on them.

mod bridge;
mod console;
mod memory;
mod queued;

pub use bridge::TracingTransport;
pub use console::ConsoleTransport;
pub use memory::MemoryTransport;
pub use queued::QueuedTransport;

use crate::entry::LogEntry;
use async_trait::async_trait;

/// Failure reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Writing to the underlying sink failed.
    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was closed and no longer accepts work.
    #[error("transport '{0}' is closed")]
    Closed(String),

    /// Any other sink-specific failure.
    #[error("transport failed: {0}")]
    Other(String),
}

/// A sink for log entries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Accept one entry. Must not panic on malformed content.
    fn write(&self, entry: &LogEntry) -> Result<(), TransportError>;

    /// Wait until every accepted entry has reached the sink.
    async fn flush(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Flush and release resources. Later writes may fail with
    /// [`TransportError::Closed`].
    async fn close(&self) -> Result<(), TransportError> {
        self.flush().await
    }
}
