// SPDX-License-Identifier: MIT OR Apache-2.0
//! Log levels and deployment environments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// Ordered log level. Numeric values leave gaps for future levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Per-item, high-volume detail.
    Trace = 0,
    /// Decision points and intermediate values.
    Debug = 10,
    /// Lifecycle events and completed operations.
    Info = 20,
    /// Recoverable or unexpected-but-handled conditions.
    Warn = 30,
    /// Failures that need attention.
    Error = 40,
    /// The process cannot continue.
    Fatal = 50,
}

impl Level {
    /// All levels, lowest first.
    pub const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    /// Numeric value (`trace = 0` … `fatal = 50`).
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Level::value`].
    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.value() == value)
    }

    /// Lowercase name as it appears in log entries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Parse a level name, falling back to [`Level::Info`] for anything
    /// unrecognised.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or(Self::Info)
    }

    /// Whether an entry at `self` passes a logger whose minimum is `min`.
    pub fn enabled_for(self, min: Level) -> bool {
        self >= min
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<Level> for tracing::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => tracing::Level::TRACE,
            Level::Debug => tracing::Level::DEBUG,
            Level::Info => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error | Level::Fatal => tracing::Level::ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Environment variable consulted by [`Environment::detect`].
pub const ENVIRONMENT_VAR: &str = "FAULTLINE_ENV";

/// Deployment environment tag carried by every log entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; verbose output and diagnostic detail in responses.
    #[default]
    Development,
    /// Production; responses never carry internal detail.
    Production,
    /// Automated tests.
    Test,
}

impl Environment {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    /// Read [`ENVIRONMENT_VAR`]; anything other than `production` or `test`
    /// means development.
    pub fn detect() -> Self {
        Self::from_name(std::env::var(ENVIRONMENT_VAR).ok().as_deref())
    }

    /// Map an optional environment name the way [`Environment::detect`] does.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_ascii_lowercase()) {
            Some(n) if n == "production" || n == "prod" => Self::Production,
            Some(n) if n == "test" => Self::Test,
            _ => Self::Development,
        }
    }

    /// Whether this is a production deployment.
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        for pair in Level::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].value() < pair[1].value());
        }
    }

    #[test]
    fn numeric_values_match_contract() {
        let values: Vec<u8> = Level::ALL.iter().map(|l| l.value()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(Level::from_value(30), Some(Level::Warn));
        assert_eq!(Level::from_value(31), None);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!(" Fatal ".parse::<Level>().unwrap(), Level::Fatal);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn lenient_parse_defaults_to_info() {
        assert_eq!(Level::parse_lenient("verbose"), Level::Info);
        assert_eq!(Level::parse_lenient("debug"), Level::Debug);
    }

    #[test]
    fn enabled_for_compares_against_minimum() {
        assert!(Level::Error.enabled_for(Level::Warn));
        assert!(Level::Warn.enabled_for(Level::Warn));
        assert!(!Level::Debug.enabled_for(Level::Warn));
    }

    #[test]
    fn level_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Level::Fatal).unwrap(), r#""fatal""#);
        let back: Level = serde_json::from_str(r#""trace""#).unwrap();
        assert_eq!(back, Level::Trace);
    }

    #[test]
    fn environment_from_name() {
        assert_eq!(
            Environment::from_name(Some("production")),
            Environment::Production
        );
        assert_eq!(Environment::from_name(Some("TEST")), Environment::Test);
        assert_eq!(
            Environment::from_name(Some("staging")),
            Environment::Development
        );
        assert_eq!(Environment::from_name(None), Environment::Development);
        assert!(Environment::Production.is_production());
        assert!(!Environment::Test.is_production());
    }
}
