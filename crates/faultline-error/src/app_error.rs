// SPDX-License-Identifier: MIT OR Apache-2.0
//! The classified application error.

use crate::kind::{Dependency, ErrorKind, Severity};
use chrono::{DateTime, SecondsFormat, Utc};
use faultline_context::keys;
use faultline_log::value::captured_backtrace;
use faultline_log::{Environment, ErrorRecord, Level, Loggable, Logger};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ErrorOptions
// ---------------------------------------------------------------------------

/// Optional parts of an [`AppError`]. Supplied values override the kind's
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct ErrorOptions {
    /// Wrapped cause.
    pub cause: Option<Loggable>,
    /// Structured metadata logged alongside the error.
    pub metadata: BTreeMap<String, Value>,
    /// Client-safe message.
    pub user_message: Option<String>,
    /// Diagnostic detail for non-production responses.
    pub details: Option<String>,
    /// Retry hint.
    pub retryable: Option<bool>,
}

impl ErrorOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cause.
    pub fn cause(mut self, cause: impl Into<Loggable>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Add a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the client-safe message.
    pub fn user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    /// Set the diagnostic detail.
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Override the retry hint.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

// ---------------------------------------------------------------------------
// Response body
// ---------------------------------------------------------------------------

/// The `error` object of an HTTP error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable code.
    pub code: String,
    /// Client-safe message.
    pub message: String,
    /// HTTP status.
    pub status_code: u16,
    /// Correlation id of the failed request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Diagnostic detail (non-production only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Creation time (non-production only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Stack (non-production only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Full HTTP error response: `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    /// The error object.
    pub error: ErrorBody,
}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    kind: ErrorKind,
    code: String,
    message: String,
    user_message: String,
    details: Option<String>,
    metadata: BTreeMap<String, Value>,
    retryable: bool,
    timestamp: DateTime<Utc>,
    request_id: Option<String>,
    stack: String,
    cause: Option<Loggable>,
}

/// A classified error. Immutable and cheap to clone; clones are the same
/// instance as far as [`AppError::ptr_eq`] is concerned.
///
/// The request id of the active context scope is captured at construction.
#[derive(Clone)]
pub struct AppError(Arc<Inner>);

impl AppError {
    /// Build an error of `kind` with the given diagnostic `message`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::with_options(kind, message, ErrorOptions::default())
    }

    /// Build an error with explicit options.
    pub fn with_options(kind: ErrorKind, message: impl Into<String>, opts: ErrorOptions) -> Self {
        let message = message.into();
        let mut metadata = BTreeMap::new();
        if let Some(dep) = kind.dependency() {
            metadata.insert("service".to_string(), Value::String(dep.service().into()));
        }
        metadata.extend(opts.metadata);

        let mut stack = format!("{}: {}", kind.type_name(), message);
        if let Some(trace) = captured_backtrace() {
            stack.push('\n');
            stack.push_str(&trace);
        }

        let request_id = faultline_context::get(keys::REQUEST_ID)
            .and_then(|v| v.as_str().map(str::to_string));

        Self(Arc::new(Inner {
            code: kind.code().into_owned(),
            user_message: opts
                .user_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| kind.default_user_message().into_owned()),
            retryable: opts.retryable.unwrap_or_else(|| kind.default_retryable()),
            details: opts.details,
            metadata,
            timestamp: Utc::now(),
            request_id,
            stack,
            cause: opts.cause,
            message,
            kind,
        }))
    }

    // -- Shorthands -----------------------------------------------------

    /// 400 `VALIDATION_ERROR`.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// 401 `AUTHENTICATION_ERROR`.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// 403 `AUTHORIZATION_ERROR`.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// 404 `NOT_FOUND`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// 409 `CONFLICT`.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// 429 `RATE_LIMIT_EXCEEDED`.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    /// 500 `INTERNAL_ERROR`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// 503 `SERVICE_UNAVAILABLE`.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// 502 for a named service.
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ExternalService(Dependency::Other(service.into())),
            message,
        )
    }

    /// 502 `EXTERNAL_SERVICE_ERROR_DATABASE`.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService(Dependency::Database), message)
    }

    /// 502 `EXTERNAL_SERVICE_ERROR_PAYMENT`.
    pub fn payment(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService(Dependency::Payment), message)
    }

    /// 502 `EXTERNAL_SERVICE_ERROR_STORAGE`.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService(Dependency::Storage), message)
    }

    /// 502 for a third-party API.
    pub fn api(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ExternalService(Dependency::Api(service.into())),
            message,
        )
    }

    /// 504 `TIMEOUT`.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    // -- Accessors ------------------------------------------------------

    /// Kind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Machine-readable code.
    pub fn code(&self) -> &str {
        &self.0.code
    }

    /// Diagnostic message (never shown to production clients).
    pub fn message(&self) -> &str {
        &self.0.message
    }

    /// HTTP status.
    pub fn status_code(&self) -> u16 {
        self.0.kind.status_code()
    }

    /// Severity.
    pub fn severity(&self) -> Severity {
        self.0.kind.severity()
    }

    /// Client-safe message.
    pub fn user_message(&self) -> &str {
        &self.0.user_message
    }

    /// Explicit diagnostic detail.
    pub fn details(&self) -> Option<&str> {
        self.0.details.as_deref()
    }

    /// Structured metadata.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.0.metadata
    }

    /// Retry hint.
    pub fn is_retryable(&self) -> bool {
        self.0.retryable
    }

    /// Creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0.timestamp
    }

    /// Request id captured at construction.
    pub fn request_id(&self) -> Option<&str> {
        self.0.request_id.as_deref()
    }

    /// `Name: message`, followed by a backtrace when capture is enabled.
    pub fn stack(&self) -> &str {
        &self.0.stack
    }

    /// Wrapped cause.
    pub fn cause(&self) -> Option<&Loggable> {
        self.0.cause.as_ref()
    }

    /// Service name for external-service errors.
    pub fn service(&self) -> Option<&str> {
        self.0.kind.dependency().map(Dependency::service)
    }

    /// Whether `a` and `b` are the same instance.
    pub fn ptr_eq(a: &AppError, b: &AppError) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // -- Output ---------------------------------------------------------

    /// Level this error is logged at.
    pub fn log_level(&self) -> Level {
        self.severity().log_level()
    }

    /// Response body. Outside production it also carries `details` (explicit
    /// details or the diagnostic message), `timestamp` and `stack`.
    pub fn to_json(&self, environment: Environment) -> ErrorBody {
        let mut body = ErrorBody {
            code: self.0.code.clone(),
            message: self.0.user_message.clone(),
            status_code: self.status_code(),
            request_id: self.0.request_id.clone(),
            details: None,
            timestamp: None,
            stack: None,
        };
        if !environment.is_production() {
            body.details = Some(
                self.0
                    .details
                    .clone()
                    .unwrap_or_else(|| self.0.message.clone()),
            );
            body.timestamp = Some(self.0.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true));
            body.stack = Some(self.0.stack.clone());
        }
        body
    }

    /// `{"error": to_json(environment)}`.
    pub fn to_response(&self, environment: Environment) -> ErrorResponse {
        ErrorResponse {
            error: self.to_json(environment),
        }
    }

    /// Log through `logger` at [`AppError::log_level`], passing an error
    /// cause as the error argument and `{code, statusCode, severity, ...}` as
    /// metadata.
    pub fn log(&self, logger: &Logger) {
        let cause = self.0.cause.as_ref().filter(|c| c.is_error()).cloned();
        logger.log(
            self.log_level(),
            &self.0.message,
            cause,
            Some(self.log_metadata()),
        );
    }

    fn log_metadata(&self) -> Loggable {
        let mut meta = BTreeMap::new();
        meta.insert("code".to_string(), Loggable::from(self.code()));
        meta.insert("statusCode".to_string(), Loggable::from(self.status_code()));
        meta.insert(
            "severity".to_string(),
            Loggable::from(self.severity().as_str()),
        );
        for (k, v) in &self.0.metadata {
            meta.insert(k.clone(), Loggable::Json(v.clone()));
        }
        Loggable::Map(meta)
    }

    /// This error as an [`ErrorRecord`], for use as a log error or a cause.
    pub fn to_record(&self) -> ErrorRecord {
        let mut record = ErrorRecord::new(self.0.kind.type_name(), self.0.message.clone())
            .with_code(self.0.code.clone())
            .with_status_code(self.status_code())
            .with_stack(self.0.stack.clone())
            .with_property("severity", self.severity().as_str())
            .with_property("userMessage", self.0.user_message.clone())
            .with_property("retryable", self.0.retryable)
            .with_property("timestamp", self.0.timestamp);
        if let Some(details) = &self.0.details {
            record = record.with_property("details", details.clone());
        }
        if !self.0.metadata.is_empty() {
            let meta = serde_json::Map::from_iter(self.0.metadata.clone());
            record = record.with_property("metadata", Value::Object(meta));
        }
        if let Some(id) = &self.0.request_id {
            record = record.with_property("requestId", id.clone());
        }
        record.cause = self.0.cause.clone();
        record
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("code", &self.0.code)
            .field("message", &self.0.message)
            .field("status_code", &self.status_code())
            .field("severity", &self.severity())
            .field("retryable", &self.0.retryable)
            .field("request_id", &self.0.request_id)
            .field("cause", &self.0.cause)
            .finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code, self.0.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0
            .cause
            .as_ref()
            .and_then(Loggable::as_error)
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<&AppError> for Loggable {
    fn from(err: &AppError) -> Self {
        Loggable::from(err.to_record())
    }
}

impl From<AppError> for Loggable {
    fn from(err: AppError) -> Self {
        Loggable::from(&err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_context::ContextMap;
    use faultline_log::{LoggerConfig, MemoryTransport};
    use serde_json::json;

    fn memory_logger(level: Level) -> (Logger, MemoryTransport) {
        let mem = MemoryTransport::new();
        let logger = Logger::new(
            LoggerConfig::new("errors")
                .level(level)
                .environment(Environment::Test)
                .transport(mem.clone()),
        );
        (logger, mem)
    }

    // -- Construction ---------------------------------------------------

    #[test]
    fn defaults_come_from_kind() {
        let e = AppError::rate_limit("slow down");
        assert_eq!(e.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(e.status_code(), 429);
        assert!(e.is_retryable());
        assert_eq!(e.user_message(), "Too many requests. Please try again later");
        assert_eq!(e.message(), "slow down");
    }

    #[test]
    fn options_override_defaults() {
        let e = AppError::with_options(
            ErrorKind::Timeout,
            "upstream slow",
            ErrorOptions::new()
                .retryable(false)
                .user_message("Try later")
                .details("p99 exceeded"),
        );
        assert!(!e.is_retryable());
        assert_eq!(e.user_message(), "Try later");
        assert_eq!(e.details(), Some("p99 exceeded"));
    }

    #[test]
    fn external_service_carries_service_metadata() {
        let e = AppError::with_options(
            ErrorKind::ExternalService(Dependency::Database),
            "pool exhausted",
            ErrorOptions::new().metadata("pool", "primary"),
        );
        assert_eq!(e.code(), "EXTERNAL_SERVICE_ERROR_DATABASE");
        assert_eq!(e.metadata()["service"], "database");
        assert_eq!(e.metadata()["pool"], "primary");
        assert_eq!(e.service(), Some("database"));
        assert!(e.is_retryable());
    }

    #[test]
    fn request_id_is_captured_from_scope() {
        let ctx = ContextMap::from([(keys::REQUEST_ID.to_string(), json!("req-9"))]);
        let e = faultline_context::run(ctx, || AppError::not_found("gone"));
        assert_eq!(e.request_id(), Some("req-9"));
        assert_eq!(AppError::not_found("gone").request_id(), None);
    }

    #[test]
    fn display_and_source() {
        let e = AppError::with_options(
            ErrorKind::Conflict,
            "dup",
            ErrorOptions::new().cause(ErrorRecord::message("unique violation")),
        );
        assert_eq!(e.to_string(), "[CONFLICT] dup");
        let src = std::error::Error::source(&e).unwrap();
        assert_eq!(src.to_string(), "unique violation");
    }

    #[test]
    fn clones_share_identity() {
        let a = AppError::internal("x");
        let b = a.clone();
        assert!(AppError::ptr_eq(&a, &b));
        assert!(!AppError::ptr_eq(&a, &AppError::internal("x")));
    }

    // -- to_json --------------------------------------------------------

    #[test]
    fn production_body_hides_diagnostics_for_every_kind() {
        for kind in ErrorKind::samples() {
            let e = AppError::new(kind.clone(), "internal detail");
            let body = e.to_json(Environment::Production);
            assert_eq!(body.code, kind.code());
            assert_eq!(body.message, kind.default_user_message());
            assert_eq!(body.status_code, kind.status_code());
            assert!(body.details.is_none());
            assert!(body.timestamp.is_none());
            assert!(body.stack.is_none());
        }
    }

    #[test]
    fn non_production_body_includes_diagnostics_for_every_kind() {
        for env in [Environment::Development, Environment::Test] {
            for kind in ErrorKind::samples() {
                let body = AppError::new(kind, "internal detail").to_json(env);
                assert_eq!(body.details.as_deref(), Some("internal detail"));
                assert!(body.timestamp.is_some());
                assert!(body.stack.as_deref().unwrap().contains("internal detail"));
            }
        }
    }

    #[test]
    fn body_serializes_camel_case() {
        let ctx = ContextMap::from([(keys::REQUEST_ID.to_string(), json!("r-1"))]);
        let e = faultline_context::run(ctx, || AppError::validation("bad"));
        let v = serde_json::to_value(e.to_response(Environment::Production)).unwrap();
        assert_eq!(
            v,
            json!({
                "error": {
                    "code": "VALIDATION_ERROR",
                    "message": "Invalid input data",
                    "statusCode": 400,
                    "requestId": "r-1"
                }
            })
        );
    }

    // -- log ------------------------------------------------------------

    #[test]
    fn log_uses_severity_level_and_metadata() {
        let (logger, mem) = memory_logger(Level::Trace);
        let e = AppError::with_options(
            ErrorKind::Validation,
            "email malformed",
            ErrorOptions::new()
                .cause(ErrorRecord::message("regex mismatch"))
                .metadata("field", "email"),
        );
        e.log(&logger);

        let entry = mem.last().unwrap();
        assert_eq!(entry.level, Level::Debug);
        assert_eq!(entry.message, "email malformed");
        let meta = entry.metadata.unwrap();
        assert_eq!(meta["code"], "VALIDATION_ERROR");
        assert_eq!(meta["statusCode"], 400);
        assert_eq!(meta["severity"], "low");
        assert_eq!(meta["field"], "email");
        assert_eq!(entry.error.unwrap()["message"], "regex mismatch");
    }

    #[test]
    fn critical_logs_at_error_without_non_error_cause() {
        let (logger, mem) = memory_logger(Level::Trace);
        let e = AppError::with_options(
            ErrorKind::Internal,
            "Unknown error occurred",
            ErrorOptions::new().cause("just a string"),
        );
        e.log(&logger);
        let entry = mem.last().unwrap();
        assert_eq!(entry.level, Level::Error);
        assert!(entry.error.is_none());
    }

    #[test]
    fn log_respects_logger_minimum() {
        let (logger, mem) = memory_logger(Level::Info);
        AppError::not_found("nope").log(&logger);
        assert!(mem.is_empty());
        AppError::conflict("dup").log(&logger);
        assert_eq!(mem.len(), 1);
    }

    #[test]
    fn record_carries_taxonomy_fields() {
        let rec = AppError::payment("card declined").to_record();
        assert_eq!(rec.name, "PaymentError");
        assert_eq!(rec.code.as_deref(), Some("EXTERNAL_SERVICE_ERROR_PAYMENT"));
        assert_eq!(rec.status_code, Some(502));
        assert!(rec.properties.contains_key("metadata"));
    }
}
