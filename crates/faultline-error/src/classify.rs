// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered mapping from caught failures to [`AppError`].
//!
//! Rules are tried top to bottom and the first match wins. Each rule either
//! produces an error or hands the input back for the next rule. The final
//! fallback always matches, so [`classify_error`] is total.

use crate::app_error::{AppError, ErrorOptions};
use crate::caught::Caught;
use crate::kind::{Dependency, ErrorKind, Severity};
use faultline_log::{ErrorRecord, Loggable};
use std::sync::Arc;
use tracing::trace;

/// Vendor code for a missing account in the cloud-auth directory.
pub const AUTH_USER_NOT_FOUND: &str = "auth/user-not-found";
/// Prefix of every cloud-auth error code.
pub const AUTH_PREFIX: &str = "auth/";
/// Prefix of relational integrity-constraint codes (SQLSTATE class 23).
pub const CONSTRAINT_PREFIX: &str = "23";
/// Unique violation.
pub const UNIQUE_VIOLATION: &str = "23505";
/// Foreign key violation.
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
/// Network codes treated as a lost database connection.
pub const CONNECTION_CODES: [&str; 3] = ["ECONNREFUSED", "ETIMEDOUT", "ENOTFOUND"];
/// Message fragments of a row-level-security rejection.
pub const POLICY_PHRASES: [&str; 2] = ["row-level security", "RLS"];

type RuleFn = fn(Caught) -> Result<AppError, Caught>;

struct Rule {
    name: &'static str,
    apply: RuleFn,
}

const RULES: &[Rule] = &[
    Rule {
        name: "app_error",
        apply: already_classified,
    },
    Rule {
        name: "not_an_error",
        apply: not_an_error,
    },
    Rule {
        name: "schema",
        apply: schema_violation,
    },
    Rule {
        name: "cloud_auth",
        apply: cloud_auth,
    },
    Rule {
        name: "constraint",
        apply: constraint_violation,
    },
    Rule {
        name: "connection",
        apply: connection_failure,
    },
    Rule {
        name: "row_level_security",
        apply: policy_rejection,
    },
    Rule {
        name: "not_found_message",
        apply: not_found_message,
    },
];

/// Classify any failure into the taxonomy. Never panics; every result
/// except a pass-through keeps the input as its cause.
pub fn classify_error(caught: impl Into<Caught>) -> AppError {
    let mut input = caught.into();
    for rule in RULES {
        match (rule.apply)(input) {
            Ok(err) => {
                trace!(rule = rule.name, code = err.code(), "classified error");
                return err;
            }
            Err(rest) => input = rest,
        }
    }
    fallback(input)
}

/// Whether an error should go to an external tracker: not for low severity,
/// validation or authentication failures.
pub fn should_report_error(err: &AppError) -> bool {
    if err.severity() == Severity::Low {
        return false;
    }
    !matches!(
        err.kind(),
        ErrorKind::Validation | ErrorKind::Authentication
    )
}

/// Whether `caught` is a cloud-auth lookup for an account that does not
/// exist. Password-reset style flows swallow this so responses do not reveal
/// which addresses are registered.
pub fn is_unknown_account(caught: &Caught) -> bool {
    let record = match caught {
        Caught::Error(rec) => Some(&**rec),
        Caught::App(app) => app.cause().and_then(Loggable::as_error).map(|rec| &**rec),
        _ => None,
    };
    record.and_then(|r| r.code.as_deref()) == Some(AUTH_USER_NOT_FOUND)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn caused_by(rec: &Arc<ErrorRecord>) -> ErrorOptions {
    ErrorOptions::new().cause(Loggable::Error(Arc::clone(rec)))
}

/// The record and its code when `caught` carries a code accepted by `pred`.
fn coded(caught: &Caught, pred: impl Fn(&str) -> bool) -> Option<(Arc<ErrorRecord>, String)> {
    match caught {
        Caught::Error(rec) => rec
            .code
            .as_deref()
            .filter(|code| pred(code))
            .map(|code| (Arc::clone(rec), code.to_string())),
        _ => None,
    }
}

fn already_classified(caught: Caught) -> Result<AppError, Caught> {
    match caught {
        Caught::App(err) => Ok(err),
        other => Err(other),
    }
}

fn not_an_error(caught: Caught) -> Result<AppError, Caught> {
    match caught {
        Caught::Value(value) => Ok(AppError::with_options(
            ErrorKind::Internal,
            "Unknown error occurred",
            ErrorOptions::new()
                .details(value.to_string())
                .cause(value),
        )),
        other => Err(other),
    }
}

fn schema_violation(caught: Caught) -> Result<AppError, Caught> {
    match caught {
        Caught::Schema(v) => Ok(AppError::with_options(
            ErrorKind::Validation,
            "Validation failed",
            ErrorOptions::new()
                .metadata("issues", v.issues_json())
                .cause(ErrorRecord::from(&v)),
        )),
        other => Err(other),
    }
}

fn cloud_auth(caught: Caught) -> Result<AppError, Caught> {
    let Some((rec, code)) = coded(&caught, |c| c.starts_with(AUTH_PREFIX)) else {
        return Err(caught);
    };
    let opts = caused_by(&rec);
    let err = match code.as_str() {
        "auth/invalid-email" | "auth/invalid-password" | "auth/weak-password" => {
            AppError::with_options(ErrorKind::Validation, rec.message.clone(), opts)
        }
        "auth/email-already-in-use" => {
            AppError::with_options(ErrorKind::Conflict, "Email already registered", opts)
        }
        // user-not-found, wrong-password, invalid-credential and anything
        // else under the prefix.
        _ => AppError::with_options(ErrorKind::Authentication, rec.message.clone(), opts),
    };
    Ok(err)
}

fn constraint_violation(caught: Caught) -> Result<AppError, Caught> {
    let Some((rec, code)) = coded(&caught, |c| c.starts_with(CONSTRAINT_PREFIX)) else {
        return Err(caught);
    };
    let opts = caused_by(&rec);
    let err = match code.as_str() {
        UNIQUE_VIOLATION => {
            AppError::with_options(ErrorKind::Conflict, "Resource already exists", opts)
        }
        FOREIGN_KEY_VIOLATION => AppError::with_options(
            ErrorKind::Validation,
            "Referenced resource does not exist",
            opts,
        ),
        _ => AppError::with_options(
            ErrorKind::ExternalService(Dependency::Database),
            "Database constraint violation",
            opts,
        ),
    };
    Ok(err)
}

fn connection_failure(caught: Caught) -> Result<AppError, Caught> {
    let Some((rec, _)) = coded(&caught, |c| CONNECTION_CODES.contains(&c)) else {
        return Err(caught);
    };
    Ok(AppError::with_options(
        ErrorKind::ExternalService(Dependency::Database),
        "Database connection failed",
        caused_by(&rec).retryable(true),
    ))
}

fn policy_rejection(caught: Caught) -> Result<AppError, Caught> {
    let rec = match &caught {
        Caught::Error(rec) if POLICY_PHRASES.iter().any(|p| rec.message.contains(p)) => {
            Arc::clone(rec)
        }
        _ => return Err(caught),
    };
    Ok(AppError::with_options(
        ErrorKind::Authorization,
        "Permission denied",
        caused_by(&rec),
    ))
}

/// Heuristic: any message mentioning "not found" or "does not exist" is
/// treated as a missing resource, even when it describes something else.
fn not_found_message(caught: Caught) -> Result<AppError, Caught> {
    let rec = match &caught {
        Caught::Error(rec) => Arc::clone(rec),
        _ => return Err(caught),
    };
    let lower = rec.message.to_lowercase();
    if lower.contains("not found") || lower.contains("does not exist") {
        Ok(AppError::with_options(
            ErrorKind::NotFound,
            rec.message.clone(),
            caused_by(&rec),
        ))
    } else {
        Err(caught)
    }
}

fn fallback(caught: Caught) -> AppError {
    let details = match &caught {
        Caught::Error(rec) => rec.message.clone(),
        Caught::Schema(v) => v.to_string(),
        Caught::Value(v) => v.to_string(),
        Caught::App(e) => e.message().to_string(),
    };
    AppError::with_options(
        ErrorKind::Internal,
        "An unexpected error occurred",
        ErrorOptions::new()
            .details(details)
            .cause(caught.to_loggable()),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
