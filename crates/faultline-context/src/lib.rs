// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;

/// Key/value contents of one context scope.
pub type ContextMap = BTreeMap<String, Value>;

/// Well-known context keys seeded by the request boundary.
pub mod keys {
    /// Correlation id of the inbound request.
    pub const REQUEST_ID: &str = "request_id";
    /// Authenticated user id, set after authentication succeeds.
    pub const USER_ID: &str = "user_id";
    /// Session id, when the caller has one.
    pub const SESSION_ID: &str = "session_id";
    /// Client address (first `x-forwarded-for` hop when proxied).
    pub const IP_ADDRESS: &str = "ip_address";
    /// Raw `user-agent` header.
    pub const USER_AGENT: &str = "user_agent";
    /// Request path.
    pub const PATH: &str = "path";
    /// HTTP method.
    pub const METHOD: &str = "method";
}

tokio::task_local! {
    static ACTIVE: RefCell<ContextMap>;
}

// ---------------------------------------------------------------------------
// Scope entry
// ---------------------------------------------------------------------------

/// Drive `fut` inside a new scope containing exactly `context`.
///
/// The scope follows the future across every suspension point, so values
/// stay attached to this unit of work even when other scopes are polled on
/// the same thread in between. Nothing is inherited from an enclosing scope.
pub async fn scope<F>(context: ContextMap, fut: F) -> F::Output
where
    F: Future,
{
    ACTIVE.scope(RefCell::new(context), fut).await
}

/// Run `f` synchronously inside a new scope containing exactly `context`.
///
/// Returns whatever `f` returns; a panic in `f` unwinds through unchanged.
pub fn run<R>(context: ContextMap, f: impl FnOnce() -> R) -> R {
    ACTIVE.sync_scope(RefCell::new(context), f)
}

/// Wrap `fut` so that it runs with a copy of the current scope.
///
/// Task-local values do not follow `tokio::spawn`; use this when handing
/// work to another task that should log under the same request. Outside any
/// scope the future is returned to run without context.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let snapshot = current();
    async move {
        match snapshot {
            Some(context) => scope(context, fut).await,
            None => fut.await,
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// Read one value from the innermost active scope.
pub fn get(key: &str) -> Option<Value> {
    ACTIVE
        .try_with(|cell| {
            cell.try_borrow()
                .ok()
                .and_then(|map| map.get(key).cloned())
        })
        .ok()
        .flatten()
}

/// Insert or overwrite a value in the innermost active scope.
///
/// Outside any scope the value is dropped.
pub fn set(key: impl Into<String>, value: impl Into<Value>) {
    let key = key.into();
    let value = value.into();
    let _ = ACTIVE.try_with(|cell| {
        if let Ok(mut map) = cell.try_borrow_mut() {
            map.insert(key, value);
        }
    });
}

/// Snapshot of the innermost scope; empty outside any scope.
pub fn get_all() -> ContextMap {
    current().unwrap_or_default()
}

/// Remove every value from the innermost scope, keeping the scope open.
pub fn clear() {
    let _ = ACTIVE.try_with(|cell| {
        if let Ok(mut map) = cell.try_borrow_mut() {
            map.clear();
        }
    });
}

/// Whether the caller is executing inside a scope.
pub fn has_context() -> bool {
    ACTIVE.try_with(|_| ()).is_ok()
}

fn current() -> Option<ContextMap> {
    ACTIVE
        .try_with(|cell| cell.try_borrow().ok().map(|map| map.clone()))
        .ok()
        .flatten()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(pairs: &[(&str, Value)]) -> ContextMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    // -- Outside any scope ----------------------------------------------

    #[test]
    fn no_scope_degrades_to_empty() {
        assert!(!has_context());
        assert_eq!(get(keys::REQUEST_ID), None);
        assert!(get_all().is_empty());
        set(keys::USER_ID, "u-1");
        clear();
        assert_eq!(get(keys::USER_ID), None);
    }

    // -- Sync scopes ----------------------------------------------------

    #[test]
    fn run_exposes_seeded_values() {
        let out = run(seed(&[(keys::REQUEST_ID, json!("r-1"))]), || {
            assert!(has_context());
            get(keys::REQUEST_ID)
        });
        assert_eq!(out, Some(json!("r-1")));
    }

    #[test]
    fn set_overwrites_existing_key() {
        run(seed(&[("k", json!(1))]), || {
            set("k", 2);
            assert_eq!(get("k"), Some(json!(2)));
            assert_eq!(get_all().len(), 1);
        });
    }

    #[test]
    fn nested_scope_shadows_and_does_not_inherit() {
        run(seed(&[("outer", json!(true)), ("shared", json!("parent"))]), || {
            run(seed(&[("shared", json!("child"))]), || {
                assert_eq!(get("outer"), None);
                assert_eq!(get("shared"), Some(json!("child")));
                set("only_child", 1);
            });
            assert_eq!(get("shared"), Some(json!("parent")));
            assert_eq!(get("only_child"), None);
        });
    }

    #[test]
    fn clear_empties_but_keeps_scope() {
        run(seed(&[("a", json!(1))]), || {
            clear();
            assert!(has_context());
            assert!(get_all().is_empty());
            set("b", 2);
            assert_eq!(get("b"), Some(json!(2)));
        });
    }

    #[test]
    fn scope_ends_when_run_returns() {
        run(ContextMap::new(), || set("x", 1));
        assert!(!has_context());
        assert_eq!(get("x"), None);
    }

    // -- Async scopes ---------------------------------------------------

    #[tokio::test]
    async fn value_survives_await() {
        scope(ContextMap::new(), async {
            set(keys::USER_ID, "u-42");
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            assert_eq!(get(keys::USER_ID), Some(json!("u-42")));
        })
        .await;
    }

    #[tokio::test]
    async fn spawned_task_does_not_inherit() {
        scope(seed(&[("k", json!("v"))]), async {
            let seen = tokio::spawn(async { get("k") }).await.unwrap();
            assert_eq!(seen, None);
        })
        .await;
    }

    #[tokio::test]
    async fn propagate_copies_current_scope() {
        scope(seed(&[("k", json!("v"))]), async {
            let seen = tokio::spawn(propagate(async {
                set("k", "changed-in-child");
                get("k")
            }))
            .await
            .unwrap();
            assert_eq!(seen, Some(json!("changed-in-child")));
            assert_eq!(get("k"), Some(json!("v")));
        })
        .await;
    }

    #[tokio::test]
    async fn propagate_outside_scope_runs_without_context() {
        let seen = propagate(async { has_context() }).await;
        assert!(!seen);
    }
}
