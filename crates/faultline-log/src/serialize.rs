// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded, total conversion of [`Loggable`] values into JSON.
//!
//! Every function here returns a value for every input: depth is capped,
//! long strings are truncated, cycles are broken, and failing accessors are
//! replaced by a placeholder local to the key that failed.

use crate::value::{ErrorRecord, Loggable, Shared};
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Deepest nesting level that is rendered; anything below becomes
/// [`MAX_DEPTH_MARKER`].
pub const MAX_DEPTH: usize = 10;
/// Strings longer than this many characters are truncated.
pub const MAX_STRING_LENGTH: usize = 10_000;
/// Appended to a truncated string.
pub const TRUNCATION_SUFFIX: &str = "...[truncated]";
/// Replaces a value nested deeper than [`MAX_DEPTH`].
pub const MAX_DEPTH_MARKER: &str = "[Max Depth Reached]";
/// Replaces a back-reference to an enclosing node.
pub const CIRCULAR_MARKER: &str = "[Circular]";
/// Replaces a value whose accessor failed.
pub const SERIALIZATION_ERROR_MARKER: &str = "[Serialization Error]";
/// Returned by [`safe_json_stringify`] when encoding fails outright.
pub const SERIALIZATION_FAILED: &str = "[Serialization Failed]";

/// Serialize a value starting at depth zero.
pub fn serialize(value: &Loggable) -> Value {
    serialize_at(value, 0)
}

/// Serialize a value as if it were nested `depth` levels deep.
pub fn serialize_at(value: &Loggable, depth: usize) -> Value {
    Walker::default().value(value, depth)
}

/// Serialize an error-like value.
///
/// Errors become `{name, message, stack?, code?, statusCode?, cause?, ...}`;
/// any other value becomes `{message: <string form>}`.
pub fn serialize_error(value: &Loggable) -> Value {
    Walker::default().error_like(value, 0)
}

/// Serialize an [`ErrorRecord`] directly.
pub fn serialize_error_record(record: &ErrorRecord) -> Value {
    Walker::default().error(record, 0)
}

/// Truncate `s` to [`MAX_STRING_LENGTH`] characters, appending
/// [`TRUNCATION_SUFFIX`] when anything was cut.
pub fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_STRING_LENGTH) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_SUFFIX.len());
            out.push_str(&s[..cut]);
            out.push_str(TRUNCATION_SUFFIX);
            out
        }
        None => s.to_string(),
    }
}

/// Encode JSON as text, compact or indented by `indent` spaces. Never fails:
/// an encoding error yields [`SERIALIZATION_FAILED`].
pub fn safe_json_stringify(value: &Value, indent: Option<usize>) -> String {
    let encoded = match indent {
        None => serde_json::to_vec(value),
        Some(n) => {
            let pad = " ".repeat(n);
            let fmt = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
            let mut buf = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
            value.serialize(&mut ser).map(|()| buf)
        }
    };
    encoded
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| SERIALIZATION_FAILED.to_string())
}

/// Serialize any [`Loggable`] and encode it as text; cycles are broken.
pub fn stringify(value: &Loggable, indent: Option<usize>) -> String {
    safe_json_stringify(&serialize(value), indent)
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Tracks the shared nodes currently being rendered so back-references can
/// be detected.
#[derive(Default)]
struct Walker {
    ancestors: Vec<usize>,
}

impl Walker {
    fn value(&mut self, value: &Loggable, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return marker(MAX_DEPTH_MARKER);
        }
        match value {
            Loggable::Null => Value::Null,
            Loggable::Bool(b) => Value::Bool(*b),
            Loggable::Int(n) => Value::from(*n),
            Loggable::UInt(n) => Value::from(*n),
            Loggable::Float(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Loggable::String(s) => Value::String(truncate(s)),
            Loggable::Timestamp(t) => {
                Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Loggable::Bytes(b) => Value::String(format!("[Buffer {} bytes]", b.len())),
            Loggable::Function(name) => Value::String(format!(
                "[Function {}]",
                name.as_deref().filter(|n| !n.is_empty()).unwrap_or("anonymous")
            )),
            Loggable::Error(record) => self.error(record, depth),
            Loggable::List(items) => Value::Array(
                items.iter().map(|item| self.value(item, depth + 1)).collect(),
            ),
            Loggable::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.value(v, depth + 1)))
                    .collect(),
            ),
            Loggable::Json(json) => self.json(json, depth),
            Loggable::Shared(node) => self.shared(node, depth, Self::value),
            Loggable::Getter(getter) => match getter.evaluate() {
                Ok(v) => self.value(&v, depth),
                Err(_) => marker(SERIALIZATION_ERROR_MARKER),
            },
        }
    }

    fn json(&mut self, value: &Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return marker(MAX_DEPTH_MARKER);
        }
        match value {
            Value::String(s) => Value::String(truncate(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.json(v, depth + 1)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.json(v, depth + 1)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn shared(
        &mut self,
        node: &Shared,
        depth: usize,
        render: fn(&mut Self, &Loggable, usize) -> Value,
    ) -> Value {
        let id = node.id();
        if self.ancestors.contains(&id) {
            return marker(CIRCULAR_MARKER);
        }
        let Ok(guard) = node.inner().lock() else {
            return marker(SERIALIZATION_ERROR_MARKER);
        };
        self.ancestors.push(id);
        let out = render(self, &guard, depth);
        self.ancestors.pop();
        out
    }

    fn error_like(&mut self, value: &Loggable, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return marker(MAX_DEPTH_MARKER);
        }
        match value {
            Loggable::Error(record) => self.error(record, depth),
            Loggable::Shared(node) => self.shared(node, depth, Self::error_like),
            other => {
                let mut obj = Map::new();
                obj.insert("message".into(), Value::String(truncate(&other.to_string())));
                Value::Object(obj)
            }
        }
    }

    fn error(&mut self, record: &ErrorRecord, depth: usize) -> Value {
        let mut obj = Map::new();
        obj.insert("name".into(), Value::String(record.name.clone()));
        obj.insert("message".into(), Value::String(truncate(&record.message)));
        if let Some(stack) = &record.stack {
            obj.insert("stack".into(), Value::String(truncate(stack)));
        }
        if let Some(code) = &record.code {
            obj.insert("code".into(), Value::String(code.clone()));
        }
        if let Some(status) = record.status_code {
            obj.insert("statusCode".into(), Value::from(status));
        }
        if let Some(cause) = &record.cause {
            obj.insert("cause".into(), self.error_like(cause, depth + 1));
        }
        for (key, value) in &record.properties {
            if obj.contains_key(key) {
                continue;
            }
            // Properties that fail to read are left out of error objects.
            let rendered = match value {
                Loggable::Getter(getter) => match getter.evaluate() {
                    Ok(v) => self.value(&v, depth + 1),
                    Err(_) => continue,
                },
                other => self.value(other, depth + 1),
            };
            obj.insert(key.clone(), rendered);
        }
        Value::Object(obj)
    }
}

fn marker(text: &str) -> Value {
    Value::String(text.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
