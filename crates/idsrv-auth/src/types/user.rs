//! Resource owners (test users).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::credentials::verify_password;

/// A user who can sign in through the login form or the password grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Stable, unique subject identifier (`sub`).
    pub subject_id: String,

    /// Login name.
    pub username: String,

    /// Argon2 PHC hash of the password.
    pub password_hash: String,

    /// Claims by type. A claim type may carry several values.
    #[serde(default)]
    pub claims: BTreeMap<String, Vec<String>>,
}

impl User {
    /// Checks `password` against the stored hash. A malformed hash never
    /// verifies.
    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        match verify_password(password, &self.password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(subject = %self.subject_id, error = %e, "Stored password hash is malformed");
                false
            }
        }
    }

    /// Returns the values of one claim type.
    #[must_use]
    pub fn claim_values(&self, claim_type: &str) -> &[String] {
        self.claims
            .get(claim_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Projects the claims whose type is in `allowed` into a JSON object.
    ///
    /// Single-valued claims become strings and multi-valued claims become
    /// arrays. `sub` is never included here; callers set it explicitly.
    #[must_use]
    pub fn claims_json(&self, allowed: &BTreeSet<String>) -> Map<String, Value> {
        let mut out = Map::new();
        for (claim_type, values) in &self.claims {
            if claim_type == "sub" || !allowed.contains(claim_type) || values.is_empty() {
                continue;
            }
            let value = match values.as_slice() {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            out.insert(claim_type.clone(), value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        let mut claims = BTreeMap::new();
        claims.insert("name".to_string(), vec!["Alice".to_string()]);
        claims.insert("website".to_string(), vec!["https://alice.com".to_string()]);
        claims.insert(
            "role".to_string(),
            vec!["admin".to_string(), "user".to_string()],
        );
        User {
            subject_id: "1".to_string(),
            username: "alice".to_string(),
            password_hash: "not-a-hash".to_string(),
            claims,
        }
    }

    #[test]
    fn test_claims_json_filters_and_shapes() {
        let allowed: BTreeSet<String> = ["name", "role"].into_iter().map(String::from).collect();
        let json = alice().claims_json(&allowed);

        assert_eq!(json["name"], "Alice");
        assert_eq!(json["role"], serde_json::json!(["admin", "user"]));
        assert!(!json.contains_key("website"));
    }

    #[test]
    fn test_claim_values() {
        let user = alice();
        assert_eq!(user.claim_values("website"), ["https://alice.com"]);
        assert!(user.claim_values("email").is_empty());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!alice().verify_password("password"));
    }
}
