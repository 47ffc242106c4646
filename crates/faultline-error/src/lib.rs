// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod app_error;
pub mod caught;
pub mod classify;
pub mod kind;

pub use app_error::{AppError, ErrorBody, ErrorOptions, ErrorResponse};
pub use caught::{Caught, Issue, SchemaViolation};
pub use classify::{classify_error, is_unknown_account, should_report_error};
pub use kind::{Dependency, ErrorKind, Severity};
