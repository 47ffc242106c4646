// SPDX-License-Identifier: MIT OR Apache-2.0
use super::{Transport, TransportError};
use crate::entry::LogEntry;
use crate::level::Level;
use crate::serialize::safe_json_stringify;
use async_trait::async_trait;
use serde_json::Value;

/// Target used for every event emitted by [`TracingTransport`].
pub const TRACING_TARGET: &str = "faultline";

/// Re-emits entries as `tracing` events so they share a subscriber with the
/// rest of the process. Context, metadata and error are attached as JSON
/// string fields; `fatal` maps to `ERROR`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

impl TracingTransport {
    /// Create the bridge.
    pub fn new() -> Self {
        Self
    }
}

fn json_field(value: Option<&Value>) -> String {
    value.map(|v| safe_json_stringify(v, None)).unwrap_or_default()
}

macro_rules! emit {
    ($macro:ident, $entry:expr, $context:expr, $metadata:expr, $error:expr) => {
        tracing::$macro!(
            target: TRACING_TARGET,
            app = $entry.app().unwrap_or_default(),
            request_id = $entry.request_id().unwrap_or_default(),
            fatal = $entry.level == Level::Fatal,
            context = %$context,
            metadata = %$metadata,
            error = %$error,
            "{}",
            $entry.message
        )
    };
}

#[async_trait]
impl Transport for TracingTransport {
    fn name(&self) -> &str {
        "tracing"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), TransportError> {
        let context = serde_json::to_value(&entry.context)
            .map(|v| safe_json_stringify(&v, None))
            .unwrap_or_default();
        let metadata = json_field(entry.metadata.as_ref());
        let error = json_field(entry.error.as_ref());
        match entry.level {
            Level::Trace => emit!(trace, entry, context, metadata, error),
            Level::Debug => emit!(debug, entry, context, metadata, error),
            Level::Info => emit!(info, entry, context, metadata, error),
            Level::Warn => emit!(warn, entry, context, metadata, error),
            Level::Error | Level::Fatal => emit!(error, entry, context, metadata, error),
        }
        Ok(())
    }
}
