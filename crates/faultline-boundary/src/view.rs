// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error boundary for component trees.
//!
//! An [`ErrorBoundary`] owns a child component and a fallback. A render
//! error or a panic inside the child is classified and logged once, then the
//! fallback is shown until [`ErrorBoundary::reset_error`] is called.

use faultline_error::{AppError, Caught, classify_error};
use faultline_log::{Environment, ErrorRecord, Logger};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A component that can fail while rendering.
pub trait Render {
    /// Rendered view.
    type Output;
    /// Render failure.
    type Error: Into<Caught>;

    /// Produce the view.
    fn render(&mut self) -> Result<Self::Output, Self::Error>;
}

type ErrorHook = Box<dyn FnMut(&AppError) + Send>;

/// Catches failures of a child component and renders a fallback instead.
pub struct ErrorBoundary<C, F> {
    child: C,
    fallback: F,
    logger: Logger,
    environment: Environment,
    error: Option<AppError>,
    on_error: Option<ErrorHook>,
}

impl<C, F> ErrorBoundary<C, F>
where
    C: Render,
    F: Fn(&AppError, Environment) -> C::Output,
{
    /// Wrap `child`, logging captured errors through `logger`.
    pub fn new(child: C, fallback: F, logger: Logger) -> Self {
        Self {
            environment: logger.environment(),
            child,
            fallback,
            logger,
            error: None,
            on_error: None,
        }
    }

    /// Observe every captured error after it has been logged.
    pub fn on_error(mut self, hook: impl FnMut(&AppError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Render the child, or the fallback while an error is held.
    pub fn render(&mut self) -> C::Output {
        if let Some(err) = &self.error {
            return (self.fallback)(err, self.environment);
        }
        let caught = match catch_unwind(AssertUnwindSafe(|| self.child.render())) {
            Ok(Ok(view)) => return view,
            Ok(Err(err)) => err.into(),
            Err(payload) => Caught::from(panic_record(payload.as_ref())),
        };
        let err = classify_error(caught);
        err.log(&self.logger);
        if let Some(hook) = self.on_error.as_mut() {
            hook(&err);
        }
        let view = (self.fallback)(&err, self.environment);
        self.error = Some(err);
        view
    }

    /// Clear the captured error; the next [`render`](Self::render) retries
    /// the child.
    pub fn reset_error(&mut self) {
        self.error = None;
    }

    /// The captured error, if any.
    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    /// Whether the fallback is showing.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The wrapped child.
    pub fn child_mut(&mut self) -> &mut C {
        &mut self.child
    }
}

fn panic_record(payload: &(dyn Any + Send)) -> ErrorRecord {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "render panicked".to_string());
    ErrorRecord::new("Panic", message)
}

/// Plain-text fallback: a fixed notice, plus the diagnostic message outside
/// production.
pub fn default_fallback(error: &AppError, environment: Environment) -> String {
    let mut out = String::from(
        "Something went wrong\nAn error occurred while rendering this component.",
    );
    if !environment.is_production() {
        out.push_str("\n\n");
        out.push_str(error.message());
    }
    out.push_str("\n[Try again]");
    out
}
