// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request body schemas.

use anyhow::{Result, anyhow};
use faultline_error::SchemaViolation;
use jsonschema::Validator;
use serde_json::{Value, json};

/// Deliberately loose address shape; delivery is the real check.
pub const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Longest accepted display name.
pub const MAX_NAME_LEN: u64 = 100;

/// Compiled validators for every JSON body the daemon accepts.
pub struct Schemas {
    waitlist: Validator,
    reset_password: Validator,
}

impl Schemas {
    /// Compile all schemas.
    pub fn compile() -> Result<Self> {
        Ok(Self {
            waitlist: compile(&waitlist_schema())?,
            reset_password: compile(&reset_password_schema())?,
        })
    }

    /// Validate a waitlist signup.
    pub fn check_waitlist(&self, body: &Value) -> Result<(), SchemaViolation> {
        SchemaViolation::check(&self.waitlist, body)
    }

    /// Validate a password reset request.
    pub fn check_reset_password(&self, body: &Value) -> Result<(), SchemaViolation> {
        SchemaViolation::check(&self.reset_password, body)
    }
}

impl std::fmt::Debug for Schemas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schemas").finish_non_exhaustive()
    }
}

fn compile(schema: &Value) -> Result<Validator> {
    jsonschema::validator_for(schema).map_err(|e| anyhow!("invalid body schema: {e}"))
}

fn email_property() -> Value {
    json!({ "type": "string", "pattern": EMAIL_PATTERN, "maxLength": 254 })
}

/// `{ email, name? }`.
pub fn waitlist_schema() -> Value {
    json!({
        "type": "object",
        "required": ["email"],
        "properties": {
            "email": email_property(),
            "name": { "type": "string", "minLength": 1, "maxLength": MAX_NAME_LEN }
        }
    })
}

/// `{ email }`.
pub fn reset_password_schema() -> Value {
    json!({
        "type": "object",
        "required": ["email"],
        "properties": { "email": email_property() }
    })
}

/// Parse a raw body, reporting malformed JSON as a validation issue.
pub fn parse_body(bytes: &[u8]) -> Result<Value, SchemaViolation> {
    serde_json::from_slice(bytes)
        .map_err(|e| SchemaViolation::single("", format!("body is not valid JSON: {e}")))
}
