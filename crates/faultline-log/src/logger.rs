// SPDX-License-Identifier: MIT OR Apache-2.0
//! The level-gated logger.

use crate::entry::{APP_KEY, ENVIRONMENT_KEY, LogEntry};
use crate::format::LogFormat;
use crate::level::{Environment, Level};
use crate::sanitize::Redactor;
use crate::serialize::{serialize, serialize_error};
use crate::transport::{ConsoleTransport, Transport, TransportError};
use crate::value::Loggable;
use chrono::{SecondsFormat, Utc};
use faultline_context::ContextMap;
use futures::future::join_all;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

/// Failure surfaced by [`Logger::flush`] and [`Logger::close`].
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// A transport failed to flush or close.
    #[error("transport '{transport}' failed: {source}")]
    Transport {
        /// Name of the failing transport.
        transport: String,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },
}

// ---------------------------------------------------------------------------
// LoggerConfig
// ---------------------------------------------------------------------------

/// Construction parameters for a [`Logger`].
#[derive(Clone)]
pub struct LoggerConfig {
    /// Application name, recorded as `context.app`.
    pub name: String,
    /// Minimum level; lower calls are dropped before any work is done.
    pub level: Level,
    /// Deployment environment, recorded as `context.environment`.
    pub environment: Environment,
    /// Context merged into every entry.
    pub context: ContextMap,
    /// Extra redact fields on top of the defaults.
    pub redact: Vec<String>,
    /// Human-oriented console output; defaults to on in development.
    pub pretty_print: Option<bool>,
    /// Sinks. When empty, [`create_logger`] installs a console transport.
    pub transports: Vec<Arc<dyn Transport>>,
}

impl LoggerConfig {
    /// Defaults for `name`: `info` level, detected environment, no extra
    /// context or redaction.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::Info,
            environment: Environment::detect(),
            context: ContextMap::new(),
            redact: Vec::new(),
            pretty_print: None,
            transports: Vec::new(),
        }
    }

    /// Set the minimum level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Add one default context value.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Add extra redact fields.
    pub fn redact<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redact.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Force pretty or JSON console output.
    pub fn pretty_print(mut self, on: bool) -> Self {
        self.pretty_print = Some(on);
        self
    }

    /// Add a transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transports.push(Arc::new(transport));
        self
    }

    /// Add an already shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Whether console output should be pretty.
    pub fn resolved_pretty_print(&self) -> bool {
        self.pretty_print
            .unwrap_or(self.environment == Environment::Development)
    }
}

impl std::fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("environment", &self.environment)
            .field("context", &self.context)
            .field("redact", &self.redact)
            .field("pretty_print", &self.pretty_print)
            .field(
                "transports",
                &self.transports.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

struct Shared {
    name: String,
    level: Level,
    environment: Environment,
    redactor: Redactor,
    transports: Vec<Arc<dyn Transport>>,
}

/// Structured logger. Cheap to clone; clones and children share transports.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    context: Arc<ContextMap>,
}

/// Build a logger from `config`, adding a console transport when none is
/// configured.
pub fn create_logger(mut config: LoggerConfig) -> Logger {
    if config.transports.is_empty() {
        let format = if config.resolved_pretty_print() {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        };
        config.transports.push(Arc::new(ConsoleTransport::new(format)));
    }
    Logger::new(config)
}

impl Logger {
    /// Build a logger using exactly the configured transports.
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: config.name,
                level: config.level,
                environment: config.environment,
                redactor: Redactor::with_fields(&config.redact),
                transports: config.transports,
            }),
            context: Arc::new(config.context),
        }
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Minimum level.
    pub fn level(&self) -> Level {
        self.shared.level
    }

    /// Environment.
    pub fn environment(&self) -> Environment {
        self.shared.environment
    }

    /// Default context merged into every entry.
    pub fn default_context(&self) -> &ContextMap {
        &self.context
    }

    /// Names of the attached transports.
    pub fn transport_names(&self) -> Vec<&str> {
        self.shared.transports.iter().map(|t| t.name()).collect()
    }

    /// Whether a call at `level` would produce an entry.
    pub fn enabled(&self, level: Level) -> bool {
        level.enabled_for(self.shared.level)
    }

    /// Log at `level` with an optional error and metadata.
    pub fn log(
        &self,
        level: Level,
        message: &str,
        error: Option<Loggable>,
        metadata: Option<Loggable>,
    ) {
        if !self.enabled(level) {
            return;
        }
        let entry = self.entry(level, message, error.as_ref(), metadata.as_ref());
        self.dispatch(&entry);
    }

    /// Log at `trace`.
    pub fn trace(&self, message: &str, metadata: Option<Loggable>) {
        self.log(Level::Trace, message, None, metadata);
    }

    /// Log at `debug`.
    pub fn debug(&self, message: &str, metadata: Option<Loggable>) {
        self.log(Level::Debug, message, None, metadata);
    }

    /// Log at `info`.
    pub fn info(&self, message: &str, metadata: Option<Loggable>) {
        self.log(Level::Info, message, None, metadata);
    }

    /// Log at `warn`.
    pub fn warn(&self, message: &str, metadata: Option<Loggable>) {
        self.log(Level::Warn, message, None, metadata);
    }

    /// Log at `error`.
    pub fn error(&self, message: &str, error: Option<Loggable>, metadata: Option<Loggable>) {
        self.log(Level::Error, message, error, metadata);
    }

    /// Log at `fatal`.
    pub fn fatal(&self, message: &str, error: Option<Loggable>, metadata: Option<Loggable>) {
        self.log(Level::Fatal, message, error, metadata);
    }

    /// A logger sharing this one's level, environment and transports, with
    /// `extra` merged over the default context.
    pub fn child(&self, extra: ContextMap) -> Logger {
        let mut context = (*self.context).clone();
        context.extend(extra);
        Logger {
            shared: Arc::clone(&self.shared),
            context: Arc::new(context),
        }
    }

    /// Await every transport's flush.
    pub async fn flush(&self) -> Result<(), LogError> {
        let results = join_all(self.shared.transports.iter().map(|t| async move {
            t.flush().await.map_err(|source| LogError::Transport {
                transport: t.name().to_string(),
                source,
            })
        }))
        .await;
        results.into_iter().collect()
    }

    /// Await every transport's close.
    pub async fn close(&self) -> Result<(), LogError> {
        let results = join_all(self.shared.transports.iter().map(|t| async move {
            t.close().await.map_err(|source| LogError::Transport {
                transport: t.name().to_string(),
                source,
            })
        }))
        .await;
        results.into_iter().collect()
    }

    fn entry(
        &self,
        level: Level,
        message: &str,
        error: Option<&Loggable>,
        metadata: Option<&Loggable>,
    ) -> LogEntry {
        let mut context = ContextMap::new();
        context.insert(APP_KEY.into(), Value::String(self.shared.name.clone()));
        context.insert(
            ENVIRONMENT_KEY.into(),
            Value::String(self.shared.environment.as_str().into()),
        );
        context.extend(self.context.iter().map(|(k, v)| (k.clone(), v.clone())));
        context.extend(faultline_context::get_all());

        LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            message: message.to_string(),
            context,
            error: error.map(serialize_error),
            metadata: metadata.map(|m| self.shared.redactor.sanitize(&serialize(m))),
        }
    }

    fn dispatch(&self, entry: &LogEntry) {
        for transport in &self.shared.transports {
            match catch_unwind(AssertUnwindSafe(|| transport.write(entry))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(transport = transport.name(), error = %e, "log transport write failed");
                }
                Err(_) => {
                    warn!(transport = transport.name(), "log transport panicked during write");
                }
            }
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.shared.name)
            .field("level", &self.shared.level)
            .field("environment", &self.shared.environment)
            .field("context", &self.context)
            .field("transports", &self.transport_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::REDACTED;
    use crate::transport::MemoryTransport;
    use crate::value::ErrorRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn logger(level: Level) -> (Logger, MemoryTransport) {
        let mem = MemoryTransport::new();
        let logger = Logger::new(
            LoggerConfig::new("hub")
                .level(level)
                .environment(Environment::Test)
                .transport(mem.clone()),
        );
        (logger, mem)
    }

    struct Exploding;

    #[async_trait]
    impl Transport for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn write(&self, _entry: &LogEntry) -> Result<(), TransportError> {
            panic!("sink blew up")
        }
    }

    struct Failing(AtomicUsize);

    #[async_trait]
    impl Transport for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn write(&self, _entry: &LogEntry) -> Result<(), TransportError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Other("nope".into()))
        }

        async fn flush(&self) -> Result<(), TransportError> {
            Err(TransportError::Other("cannot flush".into()))
        }
    }

    // -- Level gating ---------------------------------------------------

    #[test]
    fn below_minimum_produces_no_writes() {
        let (log, mem) = logger(Level::Warn);
        log.trace("t", None);
        log.debug("d", None);
        log.info("i", None);
        assert!(mem.is_empty());
    }

    #[test]
    fn at_or_above_minimum_writes_once_per_transport() {
        let second = MemoryTransport::new();
        let first = MemoryTransport::new();
        let log = Logger::new(
            LoggerConfig::new("hub")
                .level(Level::Warn)
                .transport(first.clone())
                .transport(second.clone()),
        );
        log.error("boom", None, None);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn short_circuit_skips_metadata_evaluation() {
        let (log, _mem) = logger(Level::Warn);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let getter = crate::value::Getter::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Loggable::Null)
        });
        log.debug("skipped", Some(Loggable::object([("lazy", getter)])));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // -- Entry shape ----------------------------------------------------

    #[test]
    fn context_merge_order() {
        let mem = MemoryTransport::new();
        let log = Logger::new(
            LoggerConfig::new("hub")
                .environment(Environment::Production)
                .context("region", "eu")
                .context("request_id", "from-default")
                .transport(mem.clone()),
        );
        let ctx = ContextMap::from([("request_id".to_string(), json!("from-scope"))]);
        faultline_context::run(ctx, || log.info("hello", None));

        let e = mem.last().unwrap();
        assert_eq!(e.context["app"], "hub");
        assert_eq!(e.context["environment"], "production");
        assert_eq!(e.context["region"], "eu");
        assert_eq!(e.context["request_id"], "from-scope");
        assert_eq!(e.level, Level::Info);
        assert!(e.timestamp.ends_with('Z'));
    }

    #[test]
    fn default_context_can_override_app() {
        let mem = MemoryTransport::new();
        let log = Logger::new(
            LoggerConfig::new("hub")
                .context("app", "renamed")
                .transport(mem.clone()),
        );
        log.info("x", None);
        assert_eq!(mem.last().unwrap().context["app"], "renamed");
    }

    #[test]
    fn metadata_is_serialized_then_redacted() {
        let (log, mem) = logger(Level::Trace);
        log.info(
            "login",
            Some(Loggable::object([
                ("user", Loggable::from("ann")),
                ("password", Loggable::bytes(vec![1, 2, 3])),
                (
                    "nested",
                    Loggable::object([("apiKey", Loggable::from("k"))]),
                ),
            ])),
        );
        let meta = mem.last().unwrap().metadata.unwrap();
        assert_eq!(meta["user"], "ann");
        assert_eq!(meta["password"], REDACTED);
        assert_eq!(meta["nested"]["apiKey"], REDACTED);
    }

    #[test]
    fn extra_redact_fields_apply() {
        let mem = MemoryTransport::new();
        let log = Logger::new(
            LoggerConfig::new("hub")
                .redact(["email"])
                .transport(mem.clone()),
        );
        log.info("x", Some(Loggable::object([("email", "a@b.c")])));
        assert_eq!(mem.last().unwrap().metadata.unwrap()["email"], REDACTED);
    }

    #[test]
    fn error_argument_is_serialized() {
        let (log, mem) = logger(Level::Trace);
        let err = ErrorRecord::new("PgError", "duplicate").with_code("23505");
        log.error("insert failed", Some(err.into()), None);
        let e = mem.last().unwrap();
        assert_eq!(e.error.unwrap()["code"], "23505");
        assert!(e.metadata.is_none());
    }

    // -- Children -------------------------------------------------------

    #[test]
    fn child_merges_context_and_shares_transports() {
        let (log, mem) = logger(Level::Info);
        let parent = log.child(ContextMap::from([
            ("component".to_string(), json!("auth")),
            ("layer".to_string(), json!("outer")),
        ]));
        let child = parent.child(ContextMap::from([("layer".to_string(), json!("inner"))]));
        child.info("nested", None);
        child.debug("filtered", None);

        assert_eq!(mem.len(), 1);
        let e = mem.last().unwrap();
        assert_eq!(e.context["component"], "auth");
        assert_eq!(e.context["layer"], "inner");
        assert_eq!(child.level(), Level::Info);
        assert!(log.default_context().is_empty());
    }

    // -- Transport failures ---------------------------------------------

    #[test]
    fn failing_transports_do_not_block_others() {
        let mem = MemoryTransport::new();
        let failing = Arc::new(Failing(AtomicUsize::new(0)));
        let log = Logger::new(
            LoggerConfig::new("hub")
                .transport(Exploding)
                .shared_transport(failing.clone())
                .transport(mem.clone()),
        );
        log.warn("still delivered", None);
        assert_eq!(mem.len(), 1);
        assert_eq!(failing.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flush_reports_failing_transport() {
        let log = Logger::new(
            LoggerConfig::new("hub")
                .transport(MemoryTransport::new())
                .transport(Failing(AtomicUsize::new(0))),
        );
        let err = log.flush().await.unwrap_err();
        assert!(err.to_string().contains("failing"));
    }

    #[tokio::test]
    async fn close_succeeds_for_healthy_transports() {
        let (log, _mem) = logger(Level::Info);
        log.flush().await.unwrap();
        log.close().await.unwrap();
    }

    #[test]
    fn create_logger_installs_console_when_empty() {
        let log = create_logger(LoggerConfig::new("hub").pretty_print(false));
        assert_eq!(log.transport_names(), vec!["console"]);
    }
}
