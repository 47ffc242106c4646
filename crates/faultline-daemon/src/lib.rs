// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod schema;
pub mod store;

use anyhow::Result;
use axum::Router;
use axum::extract::Request;
use axum::routing::{get, post};
use faultline_boundary::{Boundary, RateLimitGuard, request_context_middleware};
use faultline_log::Logger;
use schema::Schemas;
use std::sync::Arc;
use store::{AuthDirectory, Profile, ProfileStore, WaitlistTable};

/// Shared state for the daemon.
#[derive(Clone)]
pub struct AppState {
    /// Application logger.
    pub logger: Logger,
    /// Error boundary every route answers through.
    pub boundary: Boundary,
    /// Relational waitlist table.
    pub waitlist: WaitlistTable,
    /// Hosted-auth account directory.
    pub accounts: AuthDirectory,
    /// Profile documents.
    pub profiles: ProfileStore,
    /// Compiled body schemas.
    pub schemas: Arc<Schemas>,
    /// Router-wide request limit.
    pub rate_limit: Option<RateLimitGuard>,
}

impl AppState {
    /// Empty stores, no rate limit.
    pub fn new(logger: Logger) -> Result<Self> {
        Ok(Self {
            boundary: Boundary::new(logger.clone()),
            logger,
            waitlist: WaitlistTable::new(),
            accounts: AuthDirectory::new(),
            profiles: ProfileStore::new(),
            schemas: Arc::new(Schemas::compile()?),
            rate_limit: None,
        })
    }

    /// Limit requests across the whole router.
    pub fn with_rate_limit(mut self, guard: RateLimitGuard) -> Self {
        self.rate_limit = Some(guard);
        self
    }

    /// Replace the boundary, e.g. to attach a reporter.
    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Load a demo account with one public and one private profile.
    pub async fn seed_demo(&self) {
        self.accounts.add_account("ada@example.com").await;
        self.profiles
            .put(Profile {
                user_id: "ada".into(),
                display_name: "Ada".into(),
                public: true,
            })
            .await;
        self.profiles
            .put(Profile {
                user_id: "grace".into(),
                display_name: "Grace".into(),
                public: false,
            })
            .await;
    }
}

/// Build the router. The request-context middleware is outermost so rate
/// limit rejections still carry the request id.
pub fn build_app(state: AppState) -> Router {
    let reset = {
        let st = state.clone();
        state
            .boundary
            .with_error_handling(move |req: Request| api::reset_password(st.clone(), req))
    };

    let mut router = Router::new()
        .route("/health", get(api::health))
        .route("/api/waitlist", post(api::join_waitlist))
        .route("/api/auth/reset-password", post(reset))
        .route("/api/users/{id}/profile", get(api::user_profile))
        .with_state(state.clone());

    if let Some(guard) = state.rate_limit.clone() {
        router = router.layer(guard.into_layer(state.boundary.clone()));
    }
    router.layer(axum::middleware::from_fn_with_state(
        state.logger.clone(),
        request_context_middleware,
    ))
}
