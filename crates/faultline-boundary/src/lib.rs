// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod http;
pub mod rate_limit;
pub mod report;
pub mod view;

pub use context::{
    REQUEST_ID_HEADER, add_context, client_ip, request_context, request_context_middleware,
    set_user_context, with_logging,
};
pub use http::Boundary;
pub use rate_limit::{RateLimitGuard, RateLimitLayer, RateLimitService};
pub use report::{ErrorReporter, MemoryReporter};
pub use view::{ErrorBoundary, Render, default_fallback};
