// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route-level boundary: classify, log and respond.

use crate::report::ErrorReporter;
use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use faultline_context::keys;
use faultline_error::{AppError, Caught, ErrorResponse, classify_error, should_report_error};
use faultline_log::{Environment, Logger};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// The classify → log → respond step shared by every HTTP entry point.
///
/// Each caught failure is classified once, logged once through
/// [`AppError::log`] and rendered from [`AppError::to_json`], so the
/// production/development detail split is applied the same way everywhere.
#[derive(Clone)]
pub struct Boundary {
    logger: Logger,
    environment: Environment,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl Boundary {
    /// A boundary logging through `logger`, in the logger's environment.
    pub fn new(logger: Logger) -> Self {
        Self {
            environment: logger.environment(),
            logger,
            reporter: None,
        }
    }

    /// Override the environment that decides response detail.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Forward reportable errors to `reporter`.
    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Forward reportable errors to a shared reporter.
    pub fn with_shared_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// The logger classified errors go to.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The environment responses are rendered for.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Classify `caught`, log it and hand it to the reporter if eligible.
    pub fn capture(&self, caught: impl Into<Caught>) -> AppError {
        let err = classify_error(caught);
        err.log(&self.logger);
        self.report_if_needed(&err);
        err
    }

    /// Send `err` to the reporter when one is set and
    /// [`should_report_error`] allows it. Returns whether it was sent.
    pub fn report_if_needed(&self, err: &AppError) -> bool {
        let Some(reporter) = &self.reporter else {
            return false;
        };
        if !should_report_error(err) {
            return false;
        }
        debug!(reporter = reporter.name(), code = err.code(), "reporting error");
        reporter.report(err);
        true
    }

    /// Response body for an already classified error. The request id of the
    /// active scope wins over the one captured by the error.
    pub fn error_body(&self, err: &AppError) -> ErrorResponse {
        let mut response = err.to_response(self.environment);
        if let Some(id) = current_request_id() {
            response.error.request_id = Some(id);
        }
        response
    }

    /// Render an already classified error without logging it again.
    pub fn render(&self, err: &AppError) -> Response {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.error_body(err))).into_response()
    }

    /// Classify, log and render `caught` in one step.
    pub fn error_response(&self, caught: impl Into<Caught>) -> Response {
        let err = self.capture(caught);
        self.render(&err)
    }

    /// Turn a handler result into a response.
    pub fn respond<R, E>(&self, result: Result<R, E>) -> Response
    where
        R: IntoResponse,
        E: Into<Caught>,
    {
        match result {
            Ok(ok) => ok.into_response(),
            Err(err) => self.error_response(err),
        }
    }

    /// Await `fut` and turn its result into a response.
    pub async fn handle<Fut, R, E>(&self, fut: Fut) -> Response
    where
        Fut: Future<Output = Result<R, E>>,
        R: IntoResponse,
        E: Into<Caught>,
    {
        self.respond(fut.await)
    }

    /// Wrap `handler` into an axum handler. Successful results pass through
    /// untouched; failures become `{"error": ...}` with the error's status.
    pub fn with_error_handling<H, Fut, R, E>(
        &self,
        handler: H,
    ) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
    where
        H: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoResponse,
        E: Into<Caught>,
    {
        let boundary = self.clone();
        move |req: Request| {
            let boundary = boundary.clone();
            let handler = handler.clone();
            async move { boundary.handle(handler(req)).await }.boxed()
        }
    }
}

impl std::fmt::Debug for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Boundary")
            .field("logger", &self.logger.name())
            .field("environment", &self.environment)
            .field("reporter", &self.reporter.as_ref().map(|r| r.name()))
            .finish()
    }
}

pub(crate) fn current_request_id() -> Option<String> {
    faultline_context::get(keys::REQUEST_ID).and_then(|v| v.as_str().map(str::to_string))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use faultline_context::ContextMap;
    use faultline_log::{ErrorRecord, Level, LoggerConfig, MemoryTransport};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn boundary(env: Environment) -> (Boundary, MemoryTransport) {
        let mem = MemoryTransport::new();
        let logger = Logger::new(
            LoggerConfig::new("api")
                .level(Level::Trace)
                .environment(env)
                .transport(mem.clone()),
        );
        (Boundary::new(logger), mem)
    }

    async fn call(router: Router) -> (StatusCode, Value) {
        let resp = router
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    // -- with_error_handling --------------------------------------------

    #[tokio::test]
    async fn success_passes_through() {
        let (b, mem) = boundary(Environment::Production);
        let handler = b.with_error_handling(|_req: Request| async {
            Ok::<_, anyhow::Error>(Json(json!({ "ok": true })))
        });
        let (status, body) = call(Router::new().route("/", get(handler))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        assert!(mem.is_empty());
    }

    #[tokio::test]
    async fn vendor_failure_is_classified_and_logged_once() {
        let (b, mem) = boundary(Environment::Production);
        let handler = b.with_error_handling(|_req: Request| async {
            Err::<Json<Value>, _>(anyhow::Error::new(
                ErrorRecord::new("PostgresError", "duplicate key").with_code("23505"),
            ))
        });
        let (status, body) = call(Router::new().route("/", get(handler))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body,
            json!({
                "error": {
                    "code": "CONFLICT",
                    "message": "A conflict occurred with the existing data",
                    "statusCode": 409
                }
            })
        );
        assert_eq!(mem.len(), 1);
        assert_eq!(mem.last().unwrap().message, "Resource already exists");
    }

    #[tokio::test]
    async fn development_responses_carry_diagnostics() {
        let (b, _) = boundary(Environment::Development);
        let handler = b.with_error_handling(|_req: Request| async {
            Err::<(), _>(AppError::internal("db pool gone"))
        });
        let (status, body) = call(Router::new().route("/", get(handler))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["details"], "db pool gone");
        assert!(body["error"]["timestamp"].is_string());
        assert!(body["error"]["stack"].as_str().unwrap().contains("db pool gone"));
    }

    // -- request id -----------------------------------------------------

    #[tokio::test]
    async fn scope_request_id_wins() {
        let (b, _) = boundary(Environment::Production);
        let err = AppError::not_found("gone");
        assert_eq!(err.request_id(), None);
        let ctx = ContextMap::from([(keys::REQUEST_ID.to_string(), json!("ctx-1"))]);
        let body = faultline_context::scope(ctx, async { b.error_body(&err) }).await;
        assert_eq!(body.error.request_id.as_deref(), Some("ctx-1"));
    }

    #[test]
    fn error_request_id_used_outside_scope() {
        let (b, _) = boundary(Environment::Production);
        let ctx = ContextMap::from([(keys::REQUEST_ID.to_string(), json!("err-1"))]);
        let err = faultline_context::run(ctx, || AppError::not_found("gone"));
        assert_eq!(b.error_body(&err).error.request_id.as_deref(), Some("err-1"));
    }

    // -- reporting ------------------------------------------------------

    #[test]
    fn only_reportable_errors_reach_reporter() {
        let reporter = MemoryReporter::new();
        let (b, _) = boundary(Environment::Test);
        let b = b.with_reporter(reporter.clone());

        b.capture(AppError::validation("bad"));
        b.capture(AppError::authentication("who"));
        b.capture(ErrorRecord::message("kaboom"));
        b.capture(AppError::database("down"));

        let codes: Vec<String> = reporter
            .reported()
            .iter()
            .map(|e| e.code().to_string())
            .collect();
        assert_eq!(codes, vec!["INTERNAL_ERROR", "EXTERNAL_SERVICE_ERROR_DATABASE"]);
    }

    #[test]
    fn no_reporter_means_nothing_reported() {
        let (b, _) = boundary(Environment::Test);
        assert!(!b.report_if_needed(&AppError::internal("x")));
    }

    #[test]
    fn respond_maps_plain_strings_to_internal() {
        let (b, mem) = boundary(Environment::Test);
        let resp = b.respond(Err::<(), _>("weird"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mem.last().unwrap().message, "Unknown error occurred");
    }
}
