//! Refresh token records.
//!
//! # Security
//!
//! - The plaintext token is handed to the client once and never stored
//! - Records are looked up by the SHA-256 digest of the presented value
//! - Every record carries an absolute expiry
//! - Tokens descending from one authorization code share a lineage, so a
//!   replayed code can take down every rotation of its refresh token

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::credentials::{generate_handle, sha256_hex};

/// A server-side refresh token record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshToken {
    /// Record id.
    pub id: Uuid,

    /// SHA-256 hex digest of the token value.
    pub token_hash: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// Resource owner, absent for client-only grants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// When the resource owner authenticated (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// When this token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When this token was revoked or rotated out.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    /// Digest of the authorization code this token descends from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<String>,

    /// Access tokens minted by redeeming this token.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_tokens: Vec<MintedAccessToken>,
}

/// An access token minted from a refresh token, kept so it can be revoked
/// together with its lineage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MintedAccessToken {
    pub jti: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl RefreshToken {
    /// Creates a record for a freshly generated token and returns it together
    /// with the plaintext value.
    #[must_use]
    pub fn issue(
        client_id: impl Into<String>,
        subject: Option<String>,
        scope: impl Into<String>,
        auth_time: Option<i64>,
        lifetime: time::Duration,
    ) -> (String, Self) {
        let token = generate_handle();
        let now = OffsetDateTime::now_utc();
        let record = Self {
            id: Uuid::new_v4(),
            token_hash: Self::hash_token(&token),
            client_id: client_id.into(),
            subject,
            scope: scope.into(),
            auth_time,
            created_at: now,
            expires_at: now + lifetime,
            revoked_at: None,
            lineage: None,
            access_tokens: Vec::new(),
        };
        (token, record)
    }

    /// Ties the record to the authorization code it was minted from.
    #[must_use]
    pub fn with_lineage(mut self, lineage: Option<String>) -> Self {
        self.lineage = lineage;
        self
    }

    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }

    /// Returns `true` if this token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Returns `true` if this token is neither expired nor revoked.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }

    /// Hash a token value for storage and lookup.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        sha256_hex(token)
    }
}
