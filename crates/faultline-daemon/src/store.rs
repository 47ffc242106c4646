// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory collaborators.
//!
//! Each store fails the way its hosted counterpart does: the relational
//! table with SQLSTATE codes, the auth directory with `auth/...` codes and
//! the document store with plain messages. The classifier turns those into
//! the HTTP taxonomy without the handlers translating anything.

use chrono::{DateTime, Utc};
use faultline_log::ErrorRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Waitlist table
// ---------------------------------------------------------------------------

/// One row of the waitlist table.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    /// Row id.
    pub id: Uuid,
    /// Unique, lowercased email.
    pub email: String,
    /// Optional display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

/// Relational table with a unique index on `email`.
#[derive(Clone, Default)]
pub struct WaitlistTable {
    rows: Arc<RwLock<BTreeMap<String, WaitlistEntry>>>,
    offline: Arc<AtomicBool>,
}

impl WaitlistTable {
    /// Empty, reachable table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the database going away (`true`) or coming back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn connection(&self) -> Result<(), ErrorRecord> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ErrorRecord::new("DatabaseError", "connect ECONNREFUSED 127.0.0.1:5432")
                .with_code("ECONNREFUSED"));
        }
        Ok(())
    }

    /// Insert a row; a second insert of the same email violates the unique
    /// index.
    pub async fn insert(
        &self,
        email: &str,
        name: Option<String>,
    ) -> Result<WaitlistEntry, ErrorRecord> {
        self.connection()?;
        let email = email.to_lowercase();
        let mut rows = self.rows.write().await;
        if rows.contains_key(&email) {
            return Err(ErrorRecord::new(
                "DatabaseError",
                "duplicate key value violates unique constraint \"waitlist_email_key\"",
            )
            .with_code("23505")
            .with_property("table", "waitlist"));
        }
        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            email: email.clone(),
            name,
            created_at: Utc::now(),
        };
        rows.insert(email, entry.clone());
        Ok(entry)
    }

    /// Number of rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Whether the table has no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Auth directory
// ---------------------------------------------------------------------------

/// Hosted-auth account directory.
#[derive(Clone, Default)]
pub struct AuthDirectory {
    accounts: Arc<RwLock<BTreeSet<String>>>,
    resets: Arc<RwLock<Vec<String>>>,
}

impl AuthDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account.
    pub async fn add_account(&self, email: &str) {
        self.accounts.write().await.insert(email.to_lowercase());
    }

    /// Send a reset email, failing with `auth/user-not-found` for unknown
    /// accounts.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), ErrorRecord> {
        let email = email.to_lowercase();
        if !self.accounts.read().await.contains(&email) {
            return Err(ErrorRecord::new(
                "FirebaseAuthError",
                "There is no user record corresponding to the provided identifier.",
            )
            .with_code("auth/user-not-found"));
        }
        self.resets.write().await.push(email);
        Ok(())
    }

    /// Addresses that were sent a reset email, oldest first.
    pub async fn resets_sent(&self) -> Vec<String> {
        self.resets.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Profile store
// ---------------------------------------------------------------------------

/// A stored user profile.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Owner id.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Readable by other users.
    pub public: bool,
}

/// Document store guarded by a per-row owner policy.
#[derive(Clone, Default)]
pub struct ProfileStore {
    docs: Arc<RwLock<BTreeMap<String, Profile>>>,
}

impl ProfileStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile.
    pub async fn put(&self, profile: Profile) {
        self.docs
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }

    /// Read `user_id`'s profile on behalf of `requester`.
    pub async fn read(&self, user_id: &str, requester: &str) -> Result<Profile, ErrorRecord> {
        let docs = self.docs.read().await;
        let Some(profile) = docs.get(user_id) else {
            return Err(ErrorRecord::new(
                "StoreError",
                format!("profile {user_id} not found"),
            ));
        };
        if !profile.public && profile.user_id != requester {
            return Err(ErrorRecord::new(
                "StoreError",
                "permission denied by row-level security policy for table \"profiles\"",
            ));
        }
        Ok(profile.clone())
    }
}
