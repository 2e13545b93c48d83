//! Token issuer.
//!
//! Mints signed access and identity tokens, opaque refresh tokens, and
//! validates bearer tokens signed by this server.
//!
//! Access and identity tokens are self-contained JWTs. Refresh tokens are
//! random handles whose SHA-256 digest is stored in the
//! [`RefreshTokenStore`]; the plaintext value only ever exists in the token
//! response.

use std::sync::Arc;

use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::OAuthConfig;
use crate::error::AuthError;
use crate::oauth::scope::ScopeSet;
use crate::storage::RefreshTokenStore;
use crate::token::claims::{AccessTokenClaims, IdTokenClaims};
use crate::token::keys::{KeyStore, VerifyOptions};
use crate::types::{RefreshToken, Resources};

/// Lifetimes applied by the issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub authorization_code: Duration,
    pub access_token: Duration,
    pub identity_token: Duration,
    pub refresh_token: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self::from(&OAuthConfig::default())
    }
}

impl From<&OAuthConfig> for TokenLifetimes {
    fn from(config: &OAuthConfig) -> Self {
        let convert = |d: std::time::Duration| Duration::try_from(d).unwrap_or(Duration::MAX);
        Self {
            authorization_code: convert(config.authorization_code_lifetime),
            access_token: convert(config.access_token_lifetime),
            identity_token: convert(config.identity_token_lifetime),
            refresh_token: convert(config.refresh_token_lifetime),
        }
    }
}

/// Who an access token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSubject {
    /// The client itself. The token has no `sub`.
    Client,
    /// An authenticated resource owner.
    User {
        subject_id: String,
        auth_time: i64,
        /// Authentication methods (`amr`), e.g. `pwd`.
        amr: Vec<String>,
    },
}

impl TokenSubject {
    /// Subject of a user who signed in with a password at `auth_time`.
    #[must_use]
    pub fn password_user(subject_id: impl Into<String>, auth_time: i64) -> Self {
        Self::User {
            subject_id: subject_id.into(),
            auth_time,
            amr: vec!["pwd".to_string()],
        }
    }

    /// The subject id, if this is a user.
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            Self::Client => None,
            Self::User { subject_id, .. } => Some(subject_id),
        }
    }

    /// When the user authenticated, if this is a user.
    #[must_use]
    pub fn auth_time(&self) -> Option<i64> {
        match self {
            Self::Client => None,
            Self::User { auth_time, .. } => Some(*auth_time),
        }
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    /// Compact JWS.
    pub token: String,
    /// The token's `jti`.
    pub jti: String,
    /// Absolute expiry.
    pub expires_at: OffsetDateTime,
    /// Seconds until expiry, for `expires_in`.
    pub expires_in: u64,
}

/// A freshly issued refresh token.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    /// Plaintext handle returned to the client.
    pub token: String,
    /// Stored digest.
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

/// Inputs for an identity token.
#[derive(Debug, Clone, Default)]
pub struct IdentityTokenRequest<'a> {
    pub subject_id: &'a str,
    pub client_id: &'a str,
    pub auth_time: i64,
    pub nonce: Option<&'a str>,
    /// Identity claims released by the granted scopes.
    pub claims: Map<String, Value>,
    /// Access token returned alongside, hashed into `at_hash`.
    pub access_token: Option<&'a str>,
    /// Code returned alongside, hashed into `c_hash`.
    pub code: Option<&'a str>,
}

/// Signs and validates tokens.
pub struct TokenIssuer {
    keys: Arc<KeyStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    /// Creates an issuer over a key store and refresh token store.
    #[must_use]
    pub fn new(
        keys: Arc<KeyStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            keys,
            refresh_tokens,
            lifetimes,
        }
    }

    /// The issuer URL placed in `iss`.
    #[must_use]
    pub fn issuer(&self) -> &str {
        self.keys.issuer()
    }

    #[must_use]
    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    #[must_use]
    pub fn lifetimes(&self) -> &TokenLifetimes {
        &self.lifetimes
    }

    /// Audience for a token carrying `scopes`: every API resource exposing
    /// one of them, or `{issuer}/resources` when none does.
    #[must_use]
    pub fn audience_for(&self, resources: &Resources, scopes: &ScopeSet) -> Vec<String> {
        let audience = resources.audiences_for(scopes.iter());
        if audience.is_empty() {
            vec![format!("{}/resources", self.issuer().trim_end_matches('/'))]
        } else {
            audience
        }
    }

    /// Signs an access token.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if there is no active signing key.
    pub fn issue_access_token(
        &self,
        client_id: &str,
        subject: &TokenSubject,
        audience: Vec<String>,
        scopes: &ScopeSet,
        ttl: Duration,
    ) -> AuthResult<IssuedAccessToken> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + ttl;
        let jti = Uuid::new_v4().to_string();

        let (sub, auth_time, amr) = match subject {
            TokenSubject::Client => (None, None, None),
            TokenSubject::User {
                subject_id,
                auth_time,
                amr,
            } => (
                Some(subject_id.clone()),
                Some(*auth_time),
                (!amr.is_empty()).then(|| amr.clone()),
            ),
        };

        let claims = AccessTokenClaims {
            iss: self.issuer().to_string(),
            sub,
            aud: audience,
            exp: expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            nbf: now.unix_timestamp(),
            jti: jti.clone(),
            client_id: client_id.to_string(),
            scope: scopes.to_string(),
            auth_time,
            amr,
        };

        let token = self.keys.sign(&claims)?;

        tracing::debug!(
            client_id = %client_id,
            subject = subject.subject_id().unwrap_or("-"),
            scope = %claims.scope,
            "Issued access token"
        );

        Ok(IssuedAccessToken {
            token,
            jti,
            expires_at,
            expires_in: u64::try_from(ttl.whole_seconds()).unwrap_or(0),
        })
    }

    /// Signs an identity token.
    ///
    /// `at_hash` and `c_hash` are computed with the hash matching the key
    /// that signs the token.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if there is no active signing key.
    pub fn issue_identity_token(&self, request: IdentityTokenRequest<'_>) -> AuthResult<String> {
        let key = self.keys.current_signing_key()?;
        let now = OffsetDateTime::now_utc();

        let claims = IdTokenClaims {
            iss: self.issuer().to_string(),
            sub: request.subject_id.to_string(),
            aud: request.client_id.to_string(),
            exp: (now + self.lifetimes.identity_token).unix_timestamp(),
            iat: now.unix_timestamp(),
            auth_time: request.auth_time,
            nonce: request.nonce.map(String::from),
            at_hash: request.access_token.map(|t| key.algorithm.half_hash(t)),
            c_hash: request.code.map(|c| key.algorithm.half_hash(c)),
            claims: request.claims,
        };

        KeyStore::sign_with(&key, &claims)
    }

    /// Creates and stores a refresh token. `lineage` is the digest of the
    /// authorization code the token descends from, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh token store fails.
    pub async fn issue_refresh_token(
        &self,
        client_id: &str,
        subject: &TokenSubject,
        scopes: &ScopeSet,
        lineage: Option<&str>,
    ) -> AuthResult<IssuedRefreshToken> {
        let (token, record) = RefreshToken::issue(
            client_id,
            subject.subject_id().map(String::from),
            scopes.to_string(),
            subject.auth_time(),
            self.lifetimes.refresh_token,
        );
        let record = record.with_lineage(lineage.map(String::from));
        let token_hash = record.token_hash.clone();
        let expires_at = record.expires_at;
        self.refresh_tokens.insert(record).await?;

        tracing::debug!(client_id = %client_id, "Issued refresh token");
        Ok(IssuedRefreshToken {
            token,
            token_hash,
            expires_at,
        })
    }

    /// Replaces `presented` with a new refresh token in one atomic step.
    ///
    /// The replacement keeps the original absolute expiry and lineage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` if `presented` was already rotated, revoked or
    /// has expired.
    pub async fn rotate_refresh_token(
        &self,
        presented: &RefreshToken,
    ) -> AuthResult<IssuedRefreshToken> {
        let (token, mut replacement) = RefreshToken::issue(
            presented.client_id.clone(),
            presented.subject.clone(),
            presented.scope.clone(),
            presented.auth_time,
            self.lifetimes.refresh_token,
        );
        replacement.expires_at = presented.expires_at;
        replacement.lineage = presented.lineage.clone();
        let token_hash = replacement.token_hash.clone();
        let expires_at = replacement.expires_at;

        self.refresh_tokens
            .rotate(&presented.token_hash, replacement)
            .await?;

        tracing::debug!(client_id = %presented.client_id, "Rotated refresh token");
        Ok(IssuedRefreshToken {
            token,
            token_hash,
            expires_at,
        })
    }

    /// Resolves a presented refresh token to its record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` if the token is unknown, expired or revoked.
    pub async fn resolve_refresh_token(&self, token: &str) -> AuthResult<RefreshToken> {
        let record = self
            .refresh_tokens
            .find_by_hash(&RefreshToken::hash_token(token))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("unknown refresh token"))?;

        if record.is_revoked() {
            return Err(AuthError::invalid_grant("refresh token has been revoked"));
        }
        if record.is_expired() {
            return Err(AuthError::invalid_grant("refresh token has expired"));
        }
        Ok(record)
    }

    /// Validates an access token: signature, issuer, expiry, and audience
    /// when one is given.
    ///
    /// # Errors
    ///
    /// Returns `ExpiredToken`, `SignatureInvalid` or `InvalidToken`.
    pub fn validate_access_token(
        &self,
        token: &str,
        audience: Option<&str>,
    ) -> AuthResult<AccessTokenClaims> {
        let options = match audience {
            Some(aud) => VerifyOptions::audience(aud),
            None => VerifyOptions::default(),
        };
        Ok(self.keys.verify::<AccessTokenClaims>(token, &options)?.claims)
    }

    /// Validates an `id_token_hint`. Expired tokens are accepted; the
    /// signature and issuer must still check out.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` or `InvalidToken`.
    pub fn validate_identity_token_hint(&self, token: &str) -> AuthResult<IdTokenClaims> {
        Ok(self
            .keys
            .verify::<IdTokenClaims>(token, &VerifyOptions::allow_expired())?
            .claims)
    }
}
