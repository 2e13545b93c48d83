//! Authorization codes and their lifecycle.
//!
//! ```text
//! Requested ──► CodeIssued ──► Redeemed ──► TokensIssued
//!     │              │             │
//!     ▼              ▼             ▼
//!   Denied        Expired       Replayed (any further presentation)
//! ```
//!
//! Only the SHA-256 digest of a code is stored. A redeemed code stays in the
//! store as a tombstone so that a second presentation can be told apart from
//! an unknown code and the tokens minted from it can be revoked.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::credentials::{generate_handle, sha256_hex};
use crate::oauth::pkce::PkceChallenge;
use crate::oauth::scope::ScopeSet;

/// Where a code is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeState {
    /// Minted and waiting for redemption.
    CodeIssued,
    /// Presented once; no further presentation succeeds.
    Redeemed,
    /// Tokens were minted from the code.
    TokensIssued,
}

/// Handles of tokens minted from a code, kept for replay revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokens {
    /// `jti` of the access token.
    pub access_token_jti: String,
    /// When the access token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,
    /// Expiry of the refresh token, if one was issued. Its lineage is the
    /// code digest, and the tombstone is kept until this instant.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub refresh_token_expires_at: Option<OffsetDateTime>,
}

/// A single-use authorization code bound to one authorization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// SHA-256 hex digest of the code value.
    pub code_hash: String,
    /// Client the code was issued to.
    pub client_id: String,
    /// Authenticated resource owner.
    pub subject: String,
    /// Granted scopes.
    pub scopes: ScopeSet,
    /// Redirect URI of the authorization request.
    pub redirect_uri: String,
    /// Nonce to echo in the identity token.
    pub nonce: Option<String>,
    /// PKCE challenge (S256), if the request carried one.
    pub code_challenge: Option<PkceChallenge>,
    /// When the resource owner authenticated (Unix timestamp).
    pub auth_time: i64,
    /// When the code was minted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the code stops being redeemable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationCode {
    /// Mints a new code and returns the plaintext value with its record.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn mint(
        client_id: impl Into<String>,
        subject: impl Into<String>,
        scopes: ScopeSet,
        redirect_uri: impl Into<String>,
        nonce: Option<String>,
        code_challenge: Option<PkceChallenge>,
        auth_time: i64,
        lifetime: Duration,
    ) -> (String, Self) {
        let code = generate_handle();
        let now = OffsetDateTime::now_utc();
        let record = Self {
            code_hash: Self::hash_code(&code),
            client_id: client_id.into(),
            subject: subject.into(),
            scopes,
            redirect_uri: redirect_uri.into(),
            nonce,
            code_challenge,
            auth_time,
            created_at: now,
            expires_at: now + lifetime,
        };
        (code, record)
    }

    /// Digest used as the store key.
    #[must_use]
    pub fn hash_code(code: &str) -> String {
        sha256_hex(code)
    }

    /// Returns `true` once the code may no longer be redeemed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// Result of an atomic redemption attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Redemption {
    /// First presentation of a live code. The code is now `Redeemed`.
    Redeemed(AuthorizationCode),
    /// The code was presented before. Any tokens minted from it are listed.
    Replayed {
        /// Client the code was issued to.
        client_id: String,
        /// Tokens minted by the first redemption, if it got that far.
        issued: Option<IssuedTokens>,
    },
    /// The code outlived its lifetime before being presented.
    Expired,
    /// No such code.
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_hashes_code() {
        let (code, record) = AuthorizationCode::mint(
            "mvc2",
            "1",
            ScopeSet::parse("openid api1"),
            "https://localhost:5002/signin-oidc",
            Some("n".into()),
            None,
            1_700_000_000,
            Duration::minutes(5),
        );
        assert_eq!(record.code_hash, AuthorizationCode::hash_code(&code));
        assert_ne!(record.code_hash, code);
        assert!(!record.is_expired());
    }

    #[test]
    fn test_zero_lifetime_is_expired() {
        let (_, record) = AuthorizationCode::mint(
            "mvc2",
            "1",
            ScopeSet::parse("openid"),
            "https://localhost:5002/signin-oidc",
            None,
            None,
            0,
            Duration::ZERO,
        );
        assert!(record.is_expired());
    }
}
