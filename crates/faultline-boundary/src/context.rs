// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-request context scopes.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use faultline_context::{ContextMap, keys};
use faultline_log::{Level, Loggable, Logger};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use uuid::Uuid;

/// Header carrying the correlation id in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client address: first `x-forwarded-for` hop, else `x-real-ip`, else
/// `cf-connecting-ip`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .or_else(|| header("cf-connecting-ip"))
        .map(str::to_string)
}

/// The inbound `x-request-id`, or a fresh UUID v4.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Seed values for a request's scope. Absent headers leave their key out.
pub fn request_context(req: &Request) -> ContextMap {
    let headers = req.headers();
    let mut ctx = ContextMap::new();
    ctx.insert(keys::REQUEST_ID.into(), Value::String(request_id(headers)));
    ctx.insert(keys::METHOD.into(), Value::String(req.method().to_string()));
    ctx.insert(keys::PATH.into(), Value::String(req.uri().path().to_string()));
    if let Some(ua) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        ctx.insert(keys::USER_AGENT.into(), Value::String(ua.to_string()));
    }
    if let Some(ip) = client_ip(headers) {
        ctx.insert(keys::IP_ADDRESS.into(), Value::String(ip));
    }
    ctx
}

/// Router-wide middleware: runs the rest of the request in its own scope,
/// echoes the request id and logs "request completed" at info, warn (4xx) or
/// error (5xx).
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn_with_state(logger, request_context_middleware));
/// ```
pub async fn request_context_middleware(
    State(logger): State<Logger>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = request_context(&req);
    let id = ctx
        .get(keys::REQUEST_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let mut resp = faultline_context::scope(ctx, async move {
        let start = Instant::now();
        let resp = next.run(req).await;
        let status = resp.status().as_u16();
        let level = match status {
            500.. => Level::Error,
            400..=499 => Level::Warn,
            _ => Level::Info,
        };
        logger.log(
            level,
            "request completed",
            None,
            Some(Loggable::object([
                ("statusCode", Loggable::from(status)),
                (
                    "duration",
                    Loggable::from(start.elapsed().as_millis() as u64),
                ),
                ("method", Loggable::from(method)),
                ("path", Loggable::from(path)),
            ])),
        );
        resp
    })
    .await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    resp
}

/// Wrap a single handler so it runs inside a fresh request scope.
pub fn with_logging<H, Fut>(
    handler: H,
) -> impl Fn(Request) -> BoxFuture<'static, Fut::Output> + Clone + Send + Sync + 'static
where
    H: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send,
{
    move |req: Request| {
        let ctx = request_context(&req);
        let fut = handler(req);
        async move { faultline_context::scope(ctx, fut).await }.boxed()
    }
}

/// Record the authenticated user in the current scope.
pub fn set_user_context(user_id: &str, session_id: Option<&str>) {
    faultline_context::set(keys::USER_ID, user_id);
    if let Some(session) = session_id {
        faultline_context::set(keys::SESSION_ID, session);
    }
}

/// Add one value to the current scope.
pub fn add_context(key: impl Into<String>, value: impl Into<Value>) {
    faultline_context::set(key, value);
}
