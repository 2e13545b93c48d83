//! Claim sets carried by issued JWTs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Access token claims.
///
/// Tokens minted for a client acting on its own behalf carry no `sub`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer URL.
    pub iss: String,

    /// Subject id of the resource owner, absent for client-only tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// API resource names the token is intended for.
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Not before (Unix timestamp).
    pub nbf: i64,

    /// Unique token id, used for revocation.
    pub jti: String,

    /// OAuth client the token was issued to.
    pub client_id: String,

    /// Space-separated granted scopes.
    pub scope: String,

    /// When the resource owner authenticated (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Authentication methods used, e.g. `pwd`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,
}

impl AccessTokenClaims {
    /// Returns the granted scopes as a list.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }

    /// Returns `true` if `scope` was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }

    /// Returns `true` if `exp` lies in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.exp < OffsetDateTime::now_utc().unix_timestamp()
    }

    /// Flattens the claims into `(type, value)` pairs, one per value.
    ///
    /// Array claims (`aud`, `amr`) expand into one pair per element and
    /// `scope` expands into one pair per granted scope.
    #[must_use]
    pub fn to_claim_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let Ok(Value::Object(map)) = serde_json::to_value(self) else {
            return pairs;
        };
        for (name, value) in map {
            if name == "scope" {
                for scope in self.scopes() {
                    pairs.push((name.clone(), scope.to_string()));
                }
                continue;
            }
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.push((name.clone(), json_to_text(&item)));
                    }
                }
                other => pairs.push((name, json_to_text(&other))),
            }
        }
        pairs
    }
}

/// Identity token claims for OpenID Connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    /// Issuer URL.
    pub iss: String,

    /// Subject id of the authenticated user.
    pub sub: String,

    /// Audience (client id).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// When the user authenticated (Unix timestamp).
    pub auth_time: i64,

    /// Nonce from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Access token hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,

    /// Authorization code hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,

    /// Identity claims released by the granted identity scopes.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

fn json_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
