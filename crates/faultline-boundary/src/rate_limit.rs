// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sliding-window request limit that answers through the boundary.

use crate::http::Boundary;
use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use faultline_error::{AppError, ErrorKind, ErrorOptions};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// RateLimitGuard
// ---------------------------------------------------------------------------

/// In-memory sliding-window limiter shared by every clone.
#[derive(Clone)]
pub struct RateLimitGuard {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimitGuard {
    /// Allow `max_requests` within any `window`.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    /// Configured limit.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit one request, or fail with a retryable `RATE_LIMIT_EXCEEDED`.
    pub async fn check(&self) -> Result<(), AppError> {
        self.check_at(Instant::now()).await
    }

    async fn check_at(&self, now: Instant) -> Result<(), AppError> {
        let mut guard = self.timestamps.lock().await;

        while let Some(&front) = guard.front() {
            if now.duration_since(front) > self.window {
                guard.pop_front();
            } else {
                break;
            }
        }

        if guard.len() as u32 >= self.max_requests {
            return Err(AppError::with_options(
                ErrorKind::RateLimit,
                format!(
                    "rate limit of {} requests per {}s exceeded",
                    self.max_requests,
                    self.window.as_secs()
                ),
                ErrorOptions::new()
                    .metadata("limit", self.max_requests)
                    .metadata("windowSecs", self.window.as_secs()),
            ));
        }

        guard.push_back(now);
        Ok(())
    }

    /// Layer rejecting excess requests with a classified 429 from `boundary`.
    pub fn into_layer(self, boundary: Boundary) -> RateLimitLayer {
        RateLimitLayer {
            guard: self,
            boundary,
        }
    }
}

impl std::fmt::Debug for RateLimitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGuard")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tower plumbing
// ---------------------------------------------------------------------------

/// Tower [`Layer`](tower::Layer) wrapping services with a [`RateLimitGuard`].
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    guard: RateLimitGuard,
    boundary: Boundary,
}

impl<S: Clone> tower::Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            guard: self.guard.clone(),
            boundary: self.boundary.clone(),
            inner,
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    guard: RateLimitGuard,
    boundary: Boundary,
    inner: S,
}

impl<S> tower::Service<Request<Body>> for RateLimitService<S>
where
    S: tower::Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let guard = self.guard.clone();
        let boundary = self.boundary.clone();
        // Keep the service that was driven ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            if let Err(err) = guard.check().await {
                return Ok(boundary.error_response(err));
            }
            inner.call(req).await
        })
    }
}
