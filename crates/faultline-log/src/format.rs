// SPDX-License-Identifier: MIT OR Apache-2.0
//! Text renderings of a [`LogEntry`]: a colourised developer view and a
//! single-line JSON view.

use crate::entry::LogEntry;
use crate::level::Level;
use crate::serialize::safe_json_stringify;
use owo_colors::OwoColorize;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How entries are rendered on a console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-oriented, multi-line, optionally coloured.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Render `entry` in the given format.
pub fn format_entry(entry: &LogEntry, format: LogFormat, colored: bool) -> String {
    match format {
        LogFormat::Pretty => format_pretty(entry, colored),
        LogFormat::Json => format_json(entry),
    }
}

/// Single-line JSON.
pub fn format_json(entry: &LogEntry) -> String {
    match serde_json::to_value(entry) {
        Ok(v) => safe_json_stringify(&v, None),
        Err(_) => crate::serialize::SERIALIZATION_FAILED.to_string(),
    }
}

/// `TIME LEVEL [app] message (request)` followed by indented metadata and
/// the error chain.
pub fn format_pretty(entry: &LogEntry, colored: bool) -> String {
    let p = Palette(colored);
    let app = entry.app().unwrap_or("-");
    let mut out = format!(
        "{} {} [{}] {}",
        p.gray(&entry.timestamp),
        p.level(entry.level),
        p.blue(app),
        entry.message
    );

    if let Some(id) = entry.request_id() {
        let short: String = id.chars().take(8).collect();
        out.push_str(&p.gray(&format!(" ({short})")));
    }

    if let Some(meta) = &entry.metadata {
        let empty = matches!(meta, Value::Object(m) if m.is_empty()) || meta.is_null();
        if !empty {
            out.push('\n');
            out.push_str(&p.gray(&safe_json_stringify(meta, Some(2))));
        }
    }

    if let Some(err) = &entry.error {
        out.push('\n');
        format_error(err, &p, &mut out, 0);
    }
    out
}

fn format_error(err: &Value, p: &Palette, out: &mut String, depth: usize) {
    let name = err.get("name").and_then(Value::as_str).unwrap_or("Error");
    let message = err.get("message").and_then(Value::as_str).unwrap_or("");
    out.push_str(&p.red(&format!("  {name}: {message}")));

    if let Some(code) = err.get("code").and_then(Value::as_str) {
        out.push_str(&p.gray(&format!(" [{code}]")));
    }

    if let Some(stack) = err.get("stack").and_then(Value::as_str) {
        for line in stack.lines().map(str::trim).filter(|l| !l.is_empty()) {
            out.push('\n');
            out.push_str(&p.gray(&format!("    {line}")));
        }
    }

    match err.get("cause") {
        Some(cause) if cause.is_object() && depth < crate::serialize::MAX_DEPTH => {
            out.push('\n');
            out.push_str(&p.gray("  Caused by:"));
            out.push('\n');
            format_error(cause, p, out, depth + 1);
        }
        _ => {}
    }
}

struct Palette(bool);

impl Palette {
    fn gray(&self, s: &str) -> String {
        if self.0 { s.bright_black().to_string() } else { s.to_string() }
    }

    fn blue(&self, s: &str) -> String {
        if self.0 { s.blue().to_string() } else { s.to_string() }
    }

    fn red(&self, s: &str) -> String {
        if self.0 { s.red().to_string() } else { s.to_string() }
    }

    fn level(&self, level: Level) -> String {
        let label = format!("{:<5}", level.as_str().to_ascii_uppercase());
        if !self.0 {
            return label;
        }
        match level {
            Level::Trace => label.bright_black().to_string(),
            Level::Debug => label.cyan().to_string(),
            Level::Info => label.green().to_string(),
            Level::Warn => label.yellow().to_string(),
            Level::Error => label.red().to_string(),
            Level::Fatal => label.white().on_red().to_string(),
        }
    }
}
