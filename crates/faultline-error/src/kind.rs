// SPDX-License-Identifier: MIT OR Apache-2.0
//! The closed set of error kinds and their fixed properties.

use faultline_log::Level;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// How much attention an error deserves. Drives both the log level and
/// whether the error is reported to an external tracker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected and common (bad input, missing resource).
    Low,
    /// Expected but worth a record (auth failures, conflicts).
    Medium,
    /// Unexpected dependency trouble.
    High,
    /// A bug or unknown failure.
    Critical,
}

impl Severity {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// `low → debug`, `medium → info`, `high → warn`, `critical → error`.
    pub fn log_level(self) -> Level {
        match self {
            Self::Low => Level::Debug,
            Self::Medium => Level::Info,
            Self::High => Level::Warn,
            Self::Critical => Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Dependency
// ---------------------------------------------------------------------------

/// The external system an [`ErrorKind::ExternalService`] failure came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Relational or document database.
    Database,
    /// Payment processor.
    Payment,
    /// Object/file storage.
    Storage,
    /// A named third-party HTTP API.
    Api(String),
    /// Any other named service.
    Other(String),
}

impl Dependency {
    /// Service name as it appears in `metadata.service`.
    pub fn service(&self) -> &str {
        match self {
            Self::Database => "database",
            Self::Payment => "payment",
            Self::Storage => "storage",
            Self::Api(s) | Self::Other(s) => s,
        }
    }

    fn default_user_message(&self) -> Cow<'static, str> {
        match self {
            Self::Database => "A database error occurred".into(),
            Self::Payment => "Payment processing failed".into(),
            Self::Storage => "File storage operation failed".into(),
            Self::Api(s) => format!("Failed to communicate with {s}").into(),
            Self::Other(_) => "An external service is temporarily unavailable".into(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Database => "DatabaseError",
            Self::Payment => "PaymentError",
            Self::Storage => "StorageError",
            Self::Api(_) => "APIError",
            Self::Other(_) => "ExternalServiceError",
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Every failure that may cross a boundary is exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid input (400).
    Validation,
    /// Caller identity could not be established (401).
    Authentication,
    /// Caller lacks permission (403).
    Authorization,
    /// Resource does not exist (404).
    NotFound,
    /// Conflicts with existing data (409).
    Conflict,
    /// Too many requests (429).
    RateLimit,
    /// Unexpected failure (500).
    Internal,
    /// Temporarily unavailable (503).
    ServiceUnavailable,
    /// A dependency failed (502).
    ExternalService(Dependency),
    /// An operation ran out of time (504).
    Timeout,
}

impl ErrorKind {
    /// Every fixed kind plus one representative of each dependency.
    pub fn samples() -> Vec<ErrorKind> {
        vec![
            Self::Validation,
            Self::Authentication,
            Self::Authorization,
            Self::NotFound,
            Self::Conflict,
            Self::RateLimit,
            Self::Internal,
            Self::ServiceUnavailable,
            Self::ExternalService(Dependency::Database),
            Self::ExternalService(Dependency::Payment),
            Self::ExternalService(Dependency::Storage),
            Self::ExternalService(Dependency::Api("stripe".into())),
            Self::ExternalService(Dependency::Other("mailer".into())),
            Self::Timeout,
        ]
    }

    /// Machine-readable code. External-service codes fold in the upper-cased
    /// service name (`EXTERNAL_SERVICE_ERROR_DATABASE`).
    pub fn code(&self) -> Cow<'static, str> {
        match self {
            Self::Validation => "VALIDATION_ERROR".into(),
            Self::Authentication => "AUTHENTICATION_ERROR".into(),
            Self::Authorization => "AUTHORIZATION_ERROR".into(),
            Self::NotFound => "NOT_FOUND".into(),
            Self::Conflict => "CONFLICT".into(),
            Self::RateLimit => "RATE_LIMIT_EXCEEDED".into(),
            Self::Internal => "INTERNAL_ERROR".into(),
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE".into(),
            Self::ExternalService(dep) => {
                format!("EXTERNAL_SERVICE_ERROR_{}", dep.service().to_uppercase()).into()
            }
            Self::Timeout => "TIMEOUT".into(),
        }
    }

    /// HTTP status.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimit => 429,
            Self::Internal => 500,
            Self::ServiceUnavailable => 503,
            Self::ExternalService(_) => 502,
            Self::Timeout => 504,
        }
    }

    /// Fixed severity.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Validation | Self::NotFound | Self::RateLimit => Severity::Low,
            Self::Authentication | Self::Authorization | Self::Conflict => Severity::Medium,
            Self::ServiceUnavailable | Self::ExternalService(_) | Self::Timeout => Severity::High,
            Self::Internal => Severity::Critical,
        }
    }

    /// Whether callers may retry unless told otherwise.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ServiceUnavailable | Self::ExternalService(_) | Self::Timeout
        )
    }

    /// Client-safe message used when none is supplied.
    pub fn default_user_message(&self) -> Cow<'static, str> {
        match self {
            Self::Validation => "Invalid input data".into(),
            Self::Authentication => "Authentication failed".into(),
            Self::Authorization => "You do not have permission to perform this action".into(),
            Self::NotFound => "The requested resource was not found".into(),
            Self::Conflict => "A conflict occurred with the existing data".into(),
            Self::RateLimit => "Too many requests. Please try again later".into(),
            Self::Internal => "An unexpected error occurred".into(),
            Self::ServiceUnavailable => "Service is temporarily unavailable".into(),
            Self::ExternalService(dep) => dep.default_user_message(),
            Self::Timeout => "The operation timed out".into(),
        }
    }

    /// Type name used as the error `name` in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::Authentication => "AuthenticationError",
            Self::Authorization => "AuthorizationError",
            Self::NotFound => "NotFoundError",
            Self::Conflict => "ConflictError",
            Self::RateLimit => "RateLimitError",
            Self::Internal => "InternalError",
            Self::ServiceUnavailable => "ServiceUnavailableError",
            Self::ExternalService(dep) => dep.type_name(),
            Self::Timeout => "TimeoutError",
        }
    }

    /// The dependency, for external-service kinds.
    pub fn dependency(&self) -> Option<&Dependency> {
        match self {
            Self::ExternalService(dep) => Some(dep),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}
