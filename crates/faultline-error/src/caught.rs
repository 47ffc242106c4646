// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inputs of the classifier: anything a handler might fail with.

use crate::app_error::AppError;
use faultline_log::{ErrorRecord, Loggable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// SchemaViolation
// ---------------------------------------------------------------------------

/// One failed schema check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Dotted path of the offending field (`items.0.name`); empty for the root.
    pub path: String,
    /// What was wrong.
    pub message: String,
}

/// A schema-validation failure with one issue per violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema validation failed: {}", summary(.issues))]
pub struct SchemaViolation {
    /// Individual failures.
    pub issues: Vec<Issue>,
}

fn summary(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| {
            if i.path.is_empty() {
                i.message.clone()
            } else {
                format!("{}: {}", i.path, i.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchemaViolation {
    /// Wrap a list of issues.
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// A single issue at `path`.
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![Issue {
            path: path.into(),
            message: message.into(),
        }])
    }

    /// Validate `instance`, collecting every failure.
    pub fn check(validator: &jsonschema::Validator, instance: &Value) -> Result<(), Self> {
        let issues: Vec<Issue> = validator
            .iter_errors(instance)
            .map(|e| Issue {
                path: pointer_to_dotted(&e.instance_path.to_string()),
                message: e.to_string(),
            })
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Self::new(issues))
        }
    }

    /// Issues as JSON: `[{path, message}, ...]`.
    pub fn issues_json(&self) -> Value {
        serde_json::to_value(&self.issues).unwrap_or(Value::Array(Vec::new()))
    }
}

/// `/items/0/name` → `items.0.name`, with `~1` and `~0` unescaped.
pub fn pointer_to_dotted(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

impl From<&SchemaViolation> for ErrorRecord {
    fn from(v: &SchemaViolation) -> Self {
        ErrorRecord::new("SchemaViolation", v.to_string())
            .with_property("issues", v.issues_json())
    }
}

// ---------------------------------------------------------------------------
// Caught
// ---------------------------------------------------------------------------

/// Anything a handler may fail with, before classification.
#[derive(Clone)]
pub enum Caught {
    /// Already classified.
    App(AppError),
    /// Schema validation failure.
    Schema(SchemaViolation),
    /// An error-like object, usually from a vendor SDK.
    Error(Arc<ErrorRecord>),
    /// A value that is not an error at all.
    Value(Loggable),
}

impl Caught {
    /// The original value as a log payload, for use as a cause.
    pub fn to_loggable(&self) -> Loggable {
        match self {
            Self::App(e) => Loggable::from(e),
            Self::Schema(v) => Loggable::from(ErrorRecord::from(v)),
            Self::Error(rec) => Loggable::Error(Arc::clone(rec)),
            Self::Value(v) => v.clone(),
        }
    }
}

impl fmt::Debug for Caught {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App(e) => f.debug_tuple("App").field(e).finish(),
            Self::Schema(v) => f.debug_tuple("Schema").field(v).finish(),
            Self::Error(rec) => f.debug_tuple("Error").field(rec).finish(),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

impl From<AppError> for Caught {
    fn from(e: AppError) -> Self {
        Self::App(e)
    }
}

impl From<SchemaViolation> for Caught {
    fn from(v: SchemaViolation) -> Self {
        Self::Schema(v)
    }
}

impl From<ErrorRecord> for Caught {
    fn from(rec: ErrorRecord) -> Self {
        Self::Error(Arc::new(rec))
    }
}

impl From<Arc<ErrorRecord>> for Caught {
    fn from(rec: Arc<ErrorRecord>) -> Self {
        Self::Error(rec)
    }
}

impl From<Loggable> for Caught {
    fn from(v: Loggable) -> Self {
        match v {
            Loggable::Error(rec) => Self::Error(rec),
            other => Self::Value(other),
        }
    }
}

impl From<&str> for Caught {
    fn from(v: &str) -> Self {
        Self::Value(Loggable::from(v))
    }
}

impl From<String> for Caught {
    fn from(v: String) -> Self {
        Self::Value(Loggable::from(v))
    }
}

impl From<Value> for Caught {
    fn from(v: Value) -> Self {
        Self::Value(Loggable::Json(v))
    }
}

impl From<std::io::Error> for Caught {
    fn from(e: std::io::Error) -> Self {
        Self::from(ErrorRecord::from_error(&e))
    }
}

impl From<serde_json::Error> for Caught {
    fn from(e: serde_json::Error) -> Self {
        Self::from(ErrorRecord::new("SyntaxError", e.to_string()))
    }
}

impl From<anyhow::Error> for Caught {
    fn from(e: anyhow::Error) -> Self {
        if let Some(app) = e.downcast_ref::<AppError>() {
            return Self::App(app.clone());
        }
        if let Some(v) = e.downcast_ref::<SchemaViolation>() {
            return Self::Schema(v.clone());
        }
        if let Some(rec) = e.downcast_ref::<ErrorRecord>() {
            return Self::from(rec.clone());
        }
        let inner: &(dyn std::error::Error + 'static) = e.as_ref();
        Self::from(ErrorRecord::from_dyn(inner, 0))
    }
}
