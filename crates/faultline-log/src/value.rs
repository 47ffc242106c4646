// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dynamic values accepted as log metadata and error payloads.
//!
//! [`Loggable`] stands in for "any runtime value": it can hold primitives,
//! timestamps, byte buffers, opaque callables, errors, nested collections,
//! raw JSON, aliasable (and therefore possibly cyclic) nodes, and lazily
//! evaluated properties that may fail. The serializer turns any of these into
//! bounded JSON without panicking.

use crate::serialize;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

/// Maximum number of `source()` links followed when capturing a std error.
const MAX_SOURCE_CHAIN: usize = 32;

// ---------------------------------------------------------------------------
// Loggable
// ---------------------------------------------------------------------------

/// A dynamically typed value destined for a log entry.
#[derive(Debug, Clone, Default)]
pub enum Loggable {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point; non-finite values serialize as `null`.
    Float(f64),
    /// Text; truncated by the serializer past its length cap.
    String(String),
    /// Instant, rendered as ISO-8601.
    Timestamp(DateTime<Utc>),
    /// Binary buffer; only its length is ever logged.
    Bytes(Vec<u8>),
    /// Opaque callable, identified by name when known.
    Function(Option<String>),
    /// Error-like object.
    Error(Arc<ErrorRecord>),
    /// Ordered sequence.
    List(Vec<Loggable>),
    /// Keyed object.
    Map(BTreeMap<String, Loggable>),
    /// Pre-built JSON.
    Json(serde_json::Value),
    /// Aliasable node; the only way to build a cyclic graph.
    Shared(Shared),
    /// Property computed on access, which may fail.
    Getter(Getter),
}

impl Loggable {
    /// Build a [`Loggable::Map`] from key/value pairs.
    pub fn object<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Loggable>,
    {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wrap a binary buffer.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    /// An opaque callable with an optional name.
    pub fn function(name: Option<&str>) -> Self {
        Self::Function(name.map(str::to_string))
    }

    /// Capture any `Serialize` value as JSON. Serialization failures become a
    /// placeholder string instead of an error.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::Json(v),
            Err(_) => Self::String(serialize::SERIALIZATION_ERROR_MARKER.to_string()),
        }
    }

    /// The wrapped error record, if this value is an error.
    pub fn as_error(&self) -> Option<&Arc<ErrorRecord>> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this value is an error record.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Whether this value is [`Loggable::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Insert into a [`Loggable::Map`]; other variants are replaced by a new
    /// map holding only this entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Loggable>) {
        if let Self::Map(map) = self {
            map.insert(key.into(), value.into());
        } else {
            *self = Self::object([(key.into(), value.into())]);
        }
    }
}

/// Stringification used wherever a non-error value stands in for a message.
impl fmt::Display for Loggable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Timestamp(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Bytes(_) | Self::Function(_) => match serialize::serialize(self) {
                serde_json::Value::String(s) => f.write_str(&s),
                other => write!(f, "{other}"),
            },
            Self::Error(e) => write!(f, "{}: {}", e.name, e.message),
            Self::List(_) | Self::Map(_) | Self::Json(_) | Self::Shared(_) | Self::Getter(_) => {
                match serialize::serialize(self) {
                    serde_json::Value::String(s) => f.write_str(&s),
                    other => f.write_str(&serialize::safe_json_stringify(&other, None)),
                }
            }
        }
    }
}

macro_rules! loggable_from {
    ($variant:ident as $target:ty: $($t:ty),*) => {
        $(impl From<$t> for Loggable {
            fn from(v: $t) -> Self {
                Self::$variant(v as $target)
            }
        })*
    };
}

loggable_from!(Int as i64: i8, i16, i32, i64, isize);
loggable_from!(UInt as u64: u8, u16, u32, u64, usize);
loggable_from!(Float as f64: f32, f64);

impl From<bool> for Loggable {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Loggable {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Loggable {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&String> for Loggable {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<DateTime<Utc>> for Loggable {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<serde_json::Value> for Loggable {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<ErrorRecord> for Loggable {
    fn from(v: ErrorRecord) -> Self {
        Self::Error(Arc::new(v))
    }
}

impl From<Arc<ErrorRecord>> for Loggable {
    fn from(v: Arc<ErrorRecord>) -> Self {
        Self::Error(v)
    }
}

impl From<Shared> for Loggable {
    fn from(v: Shared) -> Self {
        Self::Shared(v)
    }
}

impl From<Getter> for Loggable {
    fn from(v: Getter) -> Self {
        Self::Getter(v)
    }
}

impl From<BTreeMap<String, Loggable>> for Loggable {
    fn from(v: BTreeMap<String, Loggable>) -> Self {
        Self::Map(v)
    }
}

impl<T: Into<Loggable>> From<Vec<T>> for Loggable {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Loggable>> From<Option<T>> for Loggable {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Aliasable, mutable node. Cloning shares the same storage, so a node can
/// be placed inside its own contents to form a cycle.
#[derive(Clone, Default)]
pub struct Shared(Arc<Mutex<Loggable>>);

impl Shared {
    /// Create a node holding `value`.
    pub fn new(value: impl Into<Loggable>) -> Self {
        Self(Arc::new(Mutex::new(value.into())))
    }

    /// Replace the node's contents.
    pub fn set(&self, value: impl Into<Loggable>) {
        let mut guard = self.0.lock().unwrap_or_else(|p| p.into_inner());
        *guard = value.into();
    }

    /// Mutate the node's contents in place.
    pub fn update(&self, f: impl FnOnce(&mut Loggable)) {
        let mut guard = self.0.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard);
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub(crate) fn inner(&self) -> &Mutex<Loggable> {
        &self.0
    }
}

impl fmt::Debug for Shared {
    // Contents are not printed: the node may contain itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:#x})", self.id())
    }
}

// ---------------------------------------------------------------------------
// Getter
// ---------------------------------------------------------------------------

type GetterFn = dyn Fn() -> Result<Loggable, String> + Send + Sync;

/// A property evaluated when the value is serialized.
#[derive(Clone)]
pub struct Getter(Arc<GetterFn>);

impl Getter {
    /// Wrap a fallible accessor.
    pub fn new(f: impl Fn() -> Result<Loggable, String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluate the accessor; a panic is reported as an error.
    pub fn evaluate(&self) -> Result<Loggable, String> {
        catch_unwind(AssertUnwindSafe(|| (self.0)()))
            .unwrap_or_else(|_| Err("accessor panicked".to_string()))
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Getter(..)")
    }
}

// ---------------------------------------------------------------------------
// ErrorRecord
// ---------------------------------------------------------------------------

/// An error-like object: the shape every caught failure is reduced to before
/// it is logged or classified.
///
/// Vendor SDKs report failures as a message plus a machine code (`"23505"`,
/// `"auth/user-not-found"`, `"ECONNREFUSED"`); [`ErrorRecord::code`] carries
/// that code verbatim.
#[derive(Debug, Clone, Default)]
pub struct ErrorRecord {
    /// Error type name (`"Error"` when unknown).
    pub name: String,
    /// Diagnostic message.
    pub message: String,
    /// Vendor or application error code.
    pub code: Option<String>,
    /// HTTP-style status, when the source carries one.
    pub status_code: Option<u16>,
    /// Captured stack trace.
    pub stack: Option<String>,
    /// Wrapped cause; any value, usually another error.
    pub cause: Option<Loggable>,
    /// Additional own properties.
    pub properties: BTreeMap<String, Loggable>,
}

impl ErrorRecord {
    /// Create a record with a type name and message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Shorthand for a generic `Error` with the given message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Attach a machine code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach an HTTP-style status.
    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attach a cause.
    pub fn with_cause(mut self, cause: impl Into<Loggable>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Attach an extra property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Loggable>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach an explicit stack string.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture the current backtrace when backtraces are enabled
    /// (`RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`).
    pub fn capture_stack(mut self) -> Self {
        self.stack = captured_backtrace();
        self
    }

    /// Build a record from any error, naming it after the concrete type and
    /// following its `source()` chain into [`ErrorRecord::cause`].
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut record = Self::from_dyn(err, 0);
        if record.name == "Error"
            && std::any::TypeId::of::<E>() != std::any::TypeId::of::<ErrorRecord>()
        {
            record.name = short_type_name(std::any::type_name::<E>()).to_string();
        }
        record
    }

    /// Build a record from a trait object, following its `source()` chain.
    pub fn from_dyn(err: &(dyn std::error::Error + 'static), depth: usize) -> Self {
        if let Some(record) = err.downcast_ref::<ErrorRecord>() {
            return record.clone();
        }
        let mut record = match err.downcast_ref::<std::io::Error>() {
            Some(io) => Self::from(io),
            None => Self::message(err.to_string()),
        };
        if record.cause.is_none() && depth < MAX_SOURCE_CHAIN {
            record.cause = err
                .source()
                .map(|source| Self::from_dyn(source, depth + 1).into());
        }
        record
    }

    /// Walk the cause chain, starting with `self`.
    pub fn chain(&self) -> impl Iterator<Item = &ErrorRecord> {
        std::iter::successors(Some(self), |r| {
            r.cause.as_ref().and_then(|c| c.as_error()).map(|e| e.as_ref())
        })
    }
}

impl From<&std::io::Error> for ErrorRecord {
    fn from(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
            ErrorKind::TimedOut => Some("ETIMEDOUT"),
            ErrorKind::ConnectionReset => Some("ECONNRESET"),
            ErrorKind::NotFound => Some("ENOENT"),
            ErrorKind::PermissionDenied => Some("EACCES"),
            _ => None,
        };
        let mut record = Self::new("IoError", err.to_string());
        record.code = code.map(str::to_string);
        if let Some(errno) = err.raw_os_error() {
            record.properties.insert("errno".into(), errno.into());
        }
        record
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .and_then(|c| c.as_error())
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Render the current backtrace if capture is enabled for this process.
pub fn captured_backtrace() -> Option<String> {
    let bt = Backtrace::capture();
    match bt.status() {
        BacktraceStatus::Captured => Some(bt.to_string()),
        _ => None,
    }
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
