// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handlers.
//!
//! Handlers return `Result<_, Caught>` and let the [`Boundary`] classify,
//! log and render failures. Collaborator errors propagate with `?` untouched.
//!
//! [`Boundary`]: faultline_boundary::Boundary

use crate::AppState;
use crate::schema::parse_body;
use crate::store::Profile;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use faultline_boundary::set_user_context;
use faultline_error::{AppError, Caught, SchemaViolation, is_unknown_account};
use faultline_log::{Loggable, mask_email};
use serde::Deserialize;
use serde_json::{Value, json};

/// Largest accepted request body.
pub const BODY_LIMIT: usize = 64 * 1024;

/// Reply to every well-formed reset request, whether or not the account
/// exists.
pub const RESET_SENT: &str = "Password reset email sent";

#[derive(Debug, Deserialize)]
struct WaitlistRequest {
    email: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    email: String,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// `GET /health`.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Waitlist
// ---------------------------------------------------------------------------

/// `POST /api/waitlist`.
pub async fn join_waitlist(State(state): State<AppState>, req: Request) -> Response {
    state.boundary.handle(waitlist_signup(&state, req)).await
}

/// Buffer at most [`BODY_LIMIT`] bytes. An oversized or broken body is a
/// validation failure so it goes through the boundary like any other.
async fn read_body(req: Request) -> Result<Bytes, SchemaViolation> {
    axum::body::to_bytes(req.into_body(), BODY_LIMIT)
        .await
        .map_err(|e| SchemaViolation::single("", format!("body could not be read: {e}")))
}

async fn waitlist_signup(
    state: &AppState,
    req: Request,
) -> Result<(StatusCode, Json<Value>), Caught> {
    let bytes = read_body(req).await?;
    let body = parse_body(&bytes)?;
    state.schemas.check_waitlist(&body)?;
    let req: WaitlistRequest = serde_json::from_value(body)?;

    let entry = state.waitlist.insert(&req.email, req.name).await?;
    state.logger.info(
        "waitlist signup",
        Some(Loggable::object([
            ("id", Loggable::from(entry.id.to_string())),
            ("email", Loggable::from(mask_email(&entry.email))),
        ])),
    );
    let entry = serde_json::to_value(&entry)?;
    Ok((StatusCode::CREATED, Json(json!({ "entry": entry }))))
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

/// `POST /api/auth/reset-password`, mounted through
/// [`Boundary::with_error_handling`](faultline_boundary::Boundary::with_error_handling).
pub async fn reset_password(state: AppState, req: Request) -> Result<Json<Value>, Caught> {
    let bytes = read_body(req).await?;
    let body = parse_body(&bytes)?;
    state.schemas.check_reset_password(&body)?;
    let req: ResetPasswordRequest = serde_json::from_value(body)?;

    if let Err(rec) = state.accounts.send_password_reset(&req.email).await {
        let caught = Caught::from(rec);
        if !is_unknown_account(&caught) {
            return Err(caught);
        }
        state.logger.info(
            "password reset for unknown account",
            Some(Loggable::object([(
                "email",
                Loggable::from(mask_email(&req.email)),
            )])),
        );
    }
    Ok(Json(json!({ "message": RESET_SENT })))
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// `GET /api/users/{id}/profile`.
pub async fn user_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.boundary.handle(read_profile(&state, &id, &headers)).await
}

async fn read_profile(
    state: &AppState,
    id: &str,
    headers: &HeaderMap,
) -> Result<Json<Profile>, Caught> {
    let requester = bearer_subject(headers)
        .ok_or_else(|| AppError::authentication("missing or malformed bearer token"))?;
    set_user_context(&requester, None);
    let profile = state.profiles.read(id, &requester).await?;
    Ok(Json(profile))
}

/// The subject of an `authorization: Bearer <subject>` header.
pub fn bearer_subject(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth(value: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        h
    }

    #[test]
    fn bearer_subject_parsing() {
        assert_eq!(bearer_subject(&auth("Bearer u-1")), Some("u-1".into()));
        assert_eq!(bearer_subject(&auth("bearer  u-2 ")), Some("u-2".into()));
        assert_eq!(bearer_subject(&auth("Basic abc")), None);
        assert_eq!(bearer_subject(&auth("Bearer ")), None);
        assert_eq!(bearer_subject(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }
}
