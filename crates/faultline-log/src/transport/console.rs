// SPDX-License-Identifier: MIT OR Apache-2.0
use super::{Transport, TransportError};
use crate::entry::LogEntry;
use crate::format::{LogFormat, format_entry};
use crate::level::Level;
use async_trait::async_trait;
use std::io::{IsTerminal, Write};
use std::sync::{Mutex, MutexGuard};

type Sink = Mutex<Box<dyn Write + Send>>;

/// Writes formatted entries to the process console: `error` and `fatal` go
/// to stderr, everything else to stdout.
pub struct ConsoleTransport {
    format: LogFormat,
    colored: bool,
    out: Sink,
    err: Sink,
}

impl ConsoleTransport {
    /// Console transport in `format`. Colour is enabled for pretty output
    /// when stdout is a terminal.
    pub fn new(format: LogFormat) -> Self {
        let colored = format == LogFormat::Pretty && std::io::stdout().is_terminal();
        Self {
            format,
            colored,
            out: Mutex::new(Box::new(std::io::stdout())),
            err: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Pretty console output.
    pub fn pretty() -> Self {
        Self::new(LogFormat::Pretty)
    }

    /// JSON-lines console output.
    pub fn json() -> Self {
        Self::new(LogFormat::Json)
    }

    /// Write to the given sinks instead of the process streams. Colour is off.
    pub fn with_writers(
        format: LogFormat,
        out: impl Write + Send + 'static,
        err: impl Write + Send + 'static,
    ) -> Self {
        Self {
            format,
            colored: false,
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
        }
    }

    /// Force colour on or off.
    pub fn colored(mut self, on: bool) -> Self {
        self.colored = on;
        self
    }

    /// Output format.
    pub fn format(&self) -> LogFormat {
        self.format
    }

    fn sink_for(&self, level: Level) -> MutexGuard<'_, Box<dyn Write + Send>> {
        let sink = if level >= Level::Error { &self.err } else { &self.out };
        sink.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for ConsoleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleTransport")
            .field("format", &self.format)
            .field("colored", &self.colored)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), TransportError> {
        let line = format_entry(entry, self.format, self.colored);
        let mut sink = self.sink_for(entry.level);
        writeln!(sink, "{line}")?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), TransportError> {
        self.sink_for(Level::Info).flush()?;
        self.sink_for(Level::Error).flush()?;
        Ok(())
    }
}
