// SPDX-License-Identifier: MIT OR Apache-2.0
//! A full router with request scopes, rate limiting and error handling.

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::get;
use faultline_boundary::{
    Boundary, RateLimitGuard, request_context_middleware, set_user_context,
};
use faultline_context::keys;
use faultline_error::AppError;
use faultline_log::{Environment, Level, Logger, LoggerConfig, MemoryTransport};
use http_body_util::BodyExt;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

fn app(limit: u32) -> (Router, MemoryTransport) {
    let mem = MemoryTransport::new();
    let logger = Logger::new(
        LoggerConfig::new("router")
            .level(Level::Trace)
            .environment(Environment::Production)
            .transport(mem.clone()),
    );
    let boundary = Boundary::new(logger.clone());

    let ok = boundary.with_error_handling(|_req: Request| async {
        set_user_context("u-42", None);
        Ok::<_, AppError>("fine")
    });
    let missing = boundary.with_error_handling(|_req: Request| async {
        Err::<(), _>(anyhow::anyhow!("widget 7 does not exist"))
    });

    let router = Router::new()
        .route("/ok", get(ok))
        .route("/missing", get(missing))
        .layer(RateLimitGuard::new(limit, Duration::from_secs(60)).into_layer(boundary))
        .layer(axum::middleware::from_fn_with_state(
            logger,
            request_context_middleware,
        ));
    (router, mem)
}

fn get_req(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .header("x-request-id", "req-abc")
        .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
        .body(Body::empty())
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// -- scope and completion log ----------------------------------------------

#[tokio::test]
async fn request_id_is_echoed_and_completion_logged() {
    let (router, mem) = app(10);
    let resp = router.oneshot(get_req("/ok")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-request-id"], "req-abc");

    let entry = mem.last().unwrap();
    assert_eq!(entry.message, "request completed");
    assert_eq!(entry.level, Level::Info);
    assert_eq!(entry.context[keys::REQUEST_ID], "req-abc");
    assert_eq!(entry.context[keys::IP_ADDRESS], "198.51.100.4");
    assert_eq!(entry.context[keys::USER_ID], "u-42");
    let meta = entry.metadata.unwrap();
    assert_eq!(meta["statusCode"], 200);
    assert_eq!(meta["path"], "/ok");
}

#[tokio::test]
async fn classified_error_carries_scope_request_id() {
    let (router, mem) = app(10);
    let resp = router.oneshot(get_req("/missing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["requestId"], "req-abc");
    assert!(body["error"].get("stack").is_none());

    let entries = mem.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "widget 7 does not exist");
    assert_eq!(entries[0].level, Level::Debug);
    assert_eq!(entries[1].message, "request completed");
    assert_eq!(entries[1].level, Level::Warn);
}

// -- rate limit ----------------------------------------------------------

#[tokio::test]
async fn excess_requests_get_classified_429() {
    let (router, _) = app(1);
    let first = router.clone().oneshot(get_req("/ok")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router.oneshot(get_req("/ok")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["x-request-id"], "req-abc");
    let body = json_body(second).await;
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(
        body["error"]["message"],
        "Too many requests. Please try again later"
    );
}
