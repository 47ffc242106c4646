// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-crate scenarios: a request enters through the boundary, the
//! classifier maps the collaborator's failure and the logger records it
//! with the request's context.

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::post;
use faultline_boundary::{Boundary, with_logging};
use faultline_context::{ContextMap, keys};
use faultline_daemon::{AppState, build_app};
use faultline_error::{AppError, ErrorKind, ErrorOptions, SchemaViolation, classify_error};
use faultline_log::{
    Environment, ErrorRecord, Level, Loggable, Logger, LoggerConfig, MemoryTransport,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

fn memory_logger(env: Environment, level: Level) -> (Logger, MemoryTransport) {
    let mem = MemoryTransport::new();
    let logger = Logger::new(
        LoggerConfig::new("e2e")
            .level(level)
            .environment(env)
            .transport(mem.clone()),
    );
    (logger, mem)
}

async fn call(app: Router, req: axum::http::Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// -- request scenarios ---------------------------------------------------------

#[tokio::test]
async fn malformed_email_is_a_400_validation_error() {
    let (logger, _) = memory_logger(Environment::Production, Level::Info);
    let app = build_app(AppState::new(logger).unwrap());
    let (status, body) = call(
        app,
        post_json("/api/waitlist", json!({"email": "ada(at)example"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["message"], "Invalid input data");
    assert_eq!(body["error"]["statusCode"], 400);
}

#[tokio::test]
async fn unique_violation_is_a_409_conflict() {
    let (logger, _) = memory_logger(Environment::Production, Level::Info);
    let app = build_app(AppState::new(logger).unwrap());
    let body = json!({"email": "ada@example.com"});
    let (first, _) = call(app.clone(), post_json("/api/waitlist", body.clone())).await;
    assert_eq!(first, StatusCode::CREATED);
    let (status, body) = call(app, post_json("/api/waitlist", body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn password_reset_hides_unknown_accounts() {
    let (logger, mem) = memory_logger(Environment::Production, Level::Trace);
    let app = build_app(AppState::new(logger).unwrap());
    let (status, body) = call(
        app,
        post_json(
            "/api/auth/reset-password",
            json!({"email": "nobody@example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password reset email sent");
    assert!(body.get("error").is_none());
    assert!(
        mem.entries()
            .iter()
            .all(|e| e.metadata.as_ref().and_then(|m| m.get("code")).is_none())
    );
}

#[tokio::test]
async fn composed_wrappers_classify_once_inside_one_scope() {
    let (logger, mem) = memory_logger(Environment::Production, Level::Trace);
    let boundary = Boundary::new(logger);
    let handler = with_logging(boundary.with_error_handling(|_req: Request| async {
        let violation = SchemaViolation::single("email", "must be an email address");
        Err::<(), _>(violation)
    }));
    let app = Router::new().route("/signup", post(handler));

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/signup")
        .header("x-request-id", "req-e2e")
        .header("x-forwarded-for", "192.0.2.10")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["requestId"], "req-e2e");

    let entries = mem.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Validation failed");
    assert_eq!(entries[0].request_id(), Some("req-e2e"));
    assert_eq!(entries[0].context[keys::IP_ADDRESS], "192.0.2.10");
    assert_eq!(entries[0].metadata.as_ref().unwrap()["issues"][0]["path"], "email");
}

// -- logger and taxonomy -------------------------------------------------------

#[test]
fn level_gate_counts_transport_writes() {
    let a = MemoryTransport::new();
    let b = MemoryTransport::new();
    let logger = Logger::new(
        LoggerConfig::new("gate")
            .level(Level::Warn)
            .transport(a.clone())
            .transport(b.clone()),
    );
    logger.debug("dropped", Some(Loggable::object([("password", "hunter2")])));
    assert!(a.is_empty() && b.is_empty());

    logger.error(
        "kept",
        Some(Loggable::from(ErrorRecord::new("Error", "boom"))),
        Some(Loggable::object([("password", "hunter2")])),
    );
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a.last().unwrap().metadata.unwrap()["password"], "[REDACTED]");
}

#[test]
fn error_bodies_hide_diagnostics_only_in_production() {
    for kind in ErrorKind::samples() {
        let err = AppError::with_options(
            kind,
            "internal diagnostic",
            ErrorOptions::new().details("row 7"),
        );
        let prod = serde_json::to_value(err.to_response(Environment::Production)).unwrap();
        for field in ["details", "timestamp", "stack"] {
            assert!(prod["error"].get(field).is_none(), "{} leaks {field}", err.code());
        }
        let dev = serde_json::to_value(err.to_response(Environment::Development)).unwrap();
        assert_eq!(dev["error"]["details"], "row 7");
        assert!(dev["error"]["timestamp"].is_string());
        assert!(dev["error"]["stack"].is_string());
    }
}

#[tokio::test]
async fn classified_error_captures_scope_request_id() {
    let mut ctx = ContextMap::new();
    ctx.insert(keys::REQUEST_ID.into(), json!("req-scope"));
    let err = faultline_context::scope(ctx, async {
        tokio::task::yield_now().await;
        classify_error(ErrorRecord::new("DatabaseError", "dup").with_code("23505"))
    })
    .await;
    assert_eq!(err.code(), "CONFLICT");
    assert_eq!(err.request_id(), Some("req-scope"));

    let outside = classify_error("plain string");
    assert_eq!(outside.request_id(), None);
    assert_eq!(outside.details(), Some("plain string"));
}
