// SPDX-License-Identifier: MIT OR Apache-2.0
//! Redaction of sensitive fields and masking helpers.

use serde_json::Value;

/// Replacement written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Key fragments that are always redacted. Matching is case-insensitive and
/// by substring, so `userPassword` and `API_KEY` are both caught.
pub const DEFAULT_REDACT_FIELDS: [&str; 18] = [
    "password",
    "token",
    "apikey",
    "api_key",
    "secret",
    "authorization",
    "cookie",
    "creditcard",
    "credit_card",
    "ssn",
    "privatekey",
    "private_key",
    "accesstoken",
    "access_token",
    "refreshtoken",
    "refresh_token",
    "idtoken",
    "id_token",
];

/// Set of key fragments to redact. Starts from [`DEFAULT_REDACT_FIELDS`] and
/// can only grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redactor {
    fields: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            fields: DEFAULT_REDACT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Redactor {
    /// The default field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus `extra`.
    pub fn with_fields<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut redactor = Self::default();
        redactor.extend(extra);
        redactor
    }

    /// Add more fragments; blanks and duplicates are ignored.
    pub fn extend<I, S>(&mut self, extra: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in extra {
            let field = field.as_ref().trim().to_lowercase();
            if !field.is_empty() && !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
    }

    /// Lowercased fragments in insertion order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether a key matches any fragment.
    pub fn should_redact(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.fields.iter().any(|f| key.contains(f.as_str()))
    }

    /// Copy `value`, replacing every matching object member with
    /// [`REDACTED`] at any depth.
    pub fn sanitize(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let v = if self.should_redact(k) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.sanitize(v)
                        };
                        (k.clone(), v)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.sanitize(v)).collect()),
            other => other.clone(),
        }
    }
}

/// Redact `value` using `redactor`.
pub fn sanitize(value: &Value, redactor: &Redactor) -> Value {
    redactor.sanitize(value)
}

/// Mask an address as `abc***@domain`; locals of three characters or fewer
/// become `***`. Input without exactly one `@` is returned unchanged.
pub fn mask_email(email: &str) -> String {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return email.to_string();
    };
    let masked = if local.chars().count() > 3 {
        let prefix: String = local.chars().take(3).collect();
        format!("{prefix}***")
    } else {
        "***".to_string()
    };
    format!("{masked}@{domain}")
}

/// Keep only the last four digits: `****1111`. Whitespace is ignored; inputs
/// shorter than four characters become `****`.
pub fn mask_credit_card(card: &str) -> String {
    let compact: Vec<char> = card.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 4 {
        return "****".to_string();
    }
    let last4: String = compact[compact.len() - 4..].iter().collect();
    format!("****{last4}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_list_has_eighteen_fields() {
        assert_eq!(Redactor::new().fields().len(), 18);
    }

    #[test]
    fn matching_is_substring_and_case_insensitive() {
        let r = Redactor::new();
        assert!(r.should_redact("userPassword"));
        assert!(r.should_redact("apiKey"));
        assert!(r.should_redact("X_API_KEY"));
        assert!(r.should_redact("bearerToken"));
        assert!(!r.should_redact("X-Api-Key"));
        assert!(!r.should_redact("email"));
    }

    #[test]
    fn nested_objects_and_arrays_are_redacted() {
        let input = json!({
            "user": { "email": "a@b.c", "password": "hunter2" },
            "items": [{ "token": "t" }, { "name": "n" }],
            "count": 3
        });
        let out = Redactor::new().sanitize(&input);
        assert_eq!(out["user"]["password"], REDACTED);
        assert_eq!(out["user"]["email"], "a@b.c");
        assert_eq!(out["items"][0]["token"], REDACTED);
        assert_eq!(out["items"][1]["name"], "n");
        assert_eq!(out["count"], 3);
    }

    #[test]
    fn redacted_object_is_replaced_wholesale() {
        let out = Redactor::new().sanitize(&json!({ "cookie": { "sid": 1 } }));
        assert_eq!(out, json!({ "cookie": REDACTED }));
    }

    #[test]
    fn primitives_are_returned_unchanged() {
        let r = Redactor::new();
        assert_eq!(r.sanitize(&json!("password")), json!("password"));
        assert_eq!(r.sanitize(&Value::Null), Value::Null);
    }

    #[test]
    fn extension_only_grows() {
        let r = Redactor::with_fields(["Email", " ", "token"]);
        assert_eq!(r.fields().len(), 19);
        assert!(r.should_redact("contact_email"));
    }

    #[test]
    fn email_masking() {
        assert_eq!(mask_email("john.doe@example.com"), "joh***@example.com");
        assert_eq!(mask_email("abc@x.io"), "***@x.io");
        assert_eq!(mask_email("not-an-email"), "not-an-email");
        assert_eq!(mask_email("a@b@c"), "a@b@c");
    }

    #[test]
    fn card_masking() {
        assert_eq!(mask_credit_card("4111 1111 1111 1111"), "****1111");
        assert_eq!(mask_credit_card("12"), "****");
    }
}
