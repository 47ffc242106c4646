// SPDX-License-Identifier: MIT OR Apache-2.0
//! The finished log record handed to transports.

use crate::level::Level;
use faultline_context::{ContextMap, keys};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context key holding the logger name.
pub const APP_KEY: &str = "app";
/// Context key holding the environment name.
pub const ENVIRONMENT_KEY: &str = "environment";

/// One structured log record. Immutable once built; transports only read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601 creation time with millisecond precision.
    pub timestamp: String,
    /// Severity of the entry.
    pub level: Level,
    /// Human-readable message.
    pub message: String,
    /// Merged logger, default and request context.
    pub context: ContextMap,
    /// Serialized error, when one was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Serialized and redacted metadata, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LogEntry {
    /// Logger name recorded in the context.
    pub fn app(&self) -> Option<&str> {
        self.context.get(APP_KEY).and_then(Value::as_str)
    }

    /// Correlation id of the request that produced this entry.
    pub fn request_id(&self) -> Option<&str> {
        self.context.get(keys::REQUEST_ID).and_then(Value::as_str)
    }
}
