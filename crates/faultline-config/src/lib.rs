// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation and merging for faultline loggers.
//!
//! [`FaultlineConfig`] describes one service's logger: name, level,
//! environment, output format, extra redaction and default context. It loads
//! from TOML, takes `FAULTLINE_*` environment overrides, validates into
//! advisory [`ConfigWarning`]s and builds a ready [`Logger`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

use faultline_log::transport::{ConsoleTransport, QueuedTransport};
use faultline_log::{
    Environment, Level, LogFormat, Logger, LoggerConfig, Redactor, level::ENVIRONMENT_VAR,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading, validating or applying a config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// A transport could not be started.
    #[error("failed to start transport: {0}")]
    Transport(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not prevent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Pretty output was requested for a production deployment.
    PrettyInProduction,
    /// `colored` was set for JSON output, where it has no effect.
    ColorIgnored,
    /// An extra redact field is already covered by the defaults.
    RedundantRedactField {
        /// The redundant entry.
        field: String,
    },
    /// The logger would drop everything below `warn`.
    QuietLevel {
        /// Configured level.
        level: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrettyInProduction => {
                f.write_str("pretty output in production; log collectors expect json")
            }
            Self::ColorIgnored => f.write_str("'colored' has no effect with json output"),
            Self::RedundantRedactField { field } => {
                write!(f, "redact field '{field}' is already redacted by default")
            }
            Self::QuietLevel { level } => {
                write!(f, "level '{level}' hides info and debug entries")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Logger settings for one service.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct FaultlineConfig {
    /// Application name, recorded as `context.app`.
    #[serde(default = "default_name")]
    pub name: String,

    /// Minimum level name (`trace`, `debug`, `info`, `warn`, `error`, `fatal`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Deployment environment; detected from `FAULTLINE_ENV` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    /// Console format name (`pretty` or `json`); pretty in development,
    /// json elsewhere when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Force colour on or off for pretty output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colored: Option<bool>,

    /// Move console writes onto a background worker.
    #[serde(default)]
    pub queued: bool,

    /// Redact fields on top of the defaults.
    #[serde(default)]
    pub redact: Vec<String>,

    /// Context merged into every entry.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,

    /// Request limit for HTTP services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_name() -> String {
    "app".into()
}

impl Default for FaultlineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            level: Some("info".into()),
            environment: None,
            format: None,
            colored: None,
            queued: false,
            redact: Vec::new(),
            context: BTreeMap::new(),
            rate_limit: None,
        }
    }
}

/// Sliding-window request limit.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Overrides [`FaultlineConfig::level`].
pub const LEVEL_VAR: &str = "FAULTLINE_LOG_LEVEL";
/// Overrides [`FaultlineConfig::format`].
pub const FORMAT_VAR: &str = "FAULTLINE_LOG_FORMAT";
/// Overrides [`FaultlineConfig::name`].
pub const NAME_VAR: &str = "FAULTLINE_APP_NAME";

/// Longest accepted rate-limit window (one day).
const MAX_WINDOW_SECS: u64 = 86_400;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

impl FaultlineConfig {
    /// Configured level, or `info` when absent or unknown.
    pub fn resolved_level(&self) -> Level {
        self.level
            .as_deref()
            .map(Level::parse_lenient)
            .unwrap_or(Level::Info)
    }

    /// Configured environment, or the detected one.
    pub fn resolved_environment(&self) -> Environment {
        self.environment.unwrap_or_else(Environment::detect)
    }

    /// Configured format, or pretty in development and json elsewhere.
    pub fn resolved_format(&self) -> LogFormat {
        match self.format.as_deref().map(LogFormat::from_str) {
            Some(Ok(format)) => format,
            _ if self.resolved_environment() == Environment::Development => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }

    /// The [`LoggerConfig`] this config describes, without transports.
    pub fn logger_config(&self) -> LoggerConfig {
        let format = self.resolved_format();
        let mut config = LoggerConfig::new(self.name.clone())
            .level(self.resolved_level())
            .environment(self.resolved_environment())
            .redact(self.redact.iter().cloned())
            .pretty_print(format == LogFormat::Pretty);
        for (k, v) in &self.context {
            config = config.context(k.clone(), v.clone());
        }
        config
    }

    /// Validate and build a logger writing to the console.
    pub fn build_logger(&self) -> Result<Logger, ConfigError> {
        validate_config(self)?;
        let format = self.resolved_format();
        let mut console = ConsoleTransport::new(format);
        if let Some(on) = self.colored {
            console = console.colored(on && format == LogFormat::Pretty);
        }
        let config = if self.queued {
            self.logger_config().transport(QueuedTransport::new(console)?)
        } else {
            self.logger_config().transport(console)
        };
        Ok(Logger::new(config))
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`FaultlineConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`FaultlineConfig::default()`].
///
/// Environment overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<FaultlineConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => FaultlineConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`FaultlineConfig`].
pub fn parse_toml(content: &str) -> Result<FaultlineConfig, ConfigError> {
    toml::from_str::<FaultlineConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply overrides from the process environment.
///
/// Recognised variables:
/// - `FAULTLINE_LOG_LEVEL`
/// - `FAULTLINE_ENV`
/// - `FAULTLINE_LOG_FORMAT`
/// - `FAULTLINE_APP_NAME`
pub fn apply_env_overrides(config: &mut FaultlineConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
pub fn apply_overrides_from(
    config: &mut FaultlineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(val) = lookup(LEVEL_VAR) {
        config.level = Some(val);
    }
    if let Some(val) = lookup(ENVIRONMENT_VAR) {
        config.environment = Some(Environment::from_name(Some(&val)));
    }
    if let Some(val) = lookup(FORMAT_VAR) {
        config.format = Some(val);
    }
    if let Some(val) = lookup(NAME_VAR) {
        config.name = val;
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Unknown level or format names, an empty name and degenerate rate limits
/// are returned as a [`ConfigError::ValidationError`].
pub fn validate_config(config: &FaultlineConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if config.name.trim().is_empty() {
        errors.push("name must not be empty".into());
    }

    if let Some(level) = &config.level {
        match Level::from_str(level) {
            Ok(parsed) if parsed >= Level::Warn => warnings.push(ConfigWarning::QuietLevel {
                level: level.clone(),
            }),
            Ok(_) => {}
            Err(_) => errors.push(format!("invalid level '{level}'")),
        }
    }

    let format = match config.format.as_deref() {
        Some(name) => match LogFormat::from_str(name) {
            Ok(format) => Some(format),
            Err(_) => {
                errors.push(format!("invalid format '{name}'"));
                None
            }
        },
        None => None,
    };
    if format == Some(LogFormat::Pretty) && config.environment == Some(Environment::Production) {
        warnings.push(ConfigWarning::PrettyInProduction);
    }
    if format == Some(LogFormat::Json) && config.colored == Some(true) {
        warnings.push(ConfigWarning::ColorIgnored);
    }

    let defaults = Redactor::new();
    for field in &config.redact {
        if field.trim().is_empty() {
            errors.push("redact fields must not be empty".into());
        } else if defaults.should_redact(field) {
            warnings.push(ConfigWarning::RedundantRedactField {
                field: field.clone(),
            });
        }
    }

    if let Some(limit) = &config.rate_limit {
        if limit.max_requests == 0 {
            errors.push("rate_limit.max_requests must be at least 1".into());
        }
        if limit.window_secs == 0 || limit.window_secs > MAX_WINDOW_SECS {
            errors.push(format!(
                "rate_limit.window_secs {} out of range (1..{MAX_WINDOW_SECS})",
                limit.window_secs
            ));
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Redact lists are concatenated without duplicates and context tables are
/// combined with overlay keys winning. A `queued` flag set on either side
/// stays set.
pub fn merge_configs(base: FaultlineConfig, overlay: FaultlineConfig) -> FaultlineConfig {
    let mut redact = base.redact;
    for field in overlay.redact {
        if !redact.contains(&field) {
            redact.push(field);
        }
    }
    let mut context = base.context;
    context.extend(overlay.context);
    let name = if overlay.name != default_name() {
        overlay.name
    } else {
        base.name
    };
    FaultlineConfig {
        name,
        level: overlay.level.or(base.level),
        environment: overlay.environment.or(base.environment),
        format: overlay.format.or(base.format),
        colored: overlay.colored.or(base.colored),
        queued: overlay.queued || base.queued,
        redact,
        context,
        rate_limit: overlay.rate_limit.or(base.rate_limit),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
