//! Access token validation for resource APIs.
//!
//! A resource API holds no session state shared with the authorization
//! server. It only sees the published JWKS and checks signature, issuer,
//! expiry and its own audience. Keys are cached and re-fetched when a token
//! names a `kid` the cache does not know, which is how a key rotation on the
//! server becomes visible here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use jsonwebtoken::{Validation, decode, decode_header};
use tokio::sync::Mutex;

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::claims::AccessTokenClaims;
use crate::token::jwt::{Jwks, JwtError};
use crate::token::keys::KeyStore;

/// Minimum time between two JWKS fetches triggered by unknown key ids.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Where a resource API gets the authorization server's public keys.
#[async_trait]
pub trait JwksSource: Send + Sync {
    /// Returns the current key set.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be obtained.
    async fn fetch_jwks(&self) -> AuthResult<Jwks>;
}

#[async_trait]
impl JwksSource for KeyStore {
    async fn fetch_jwks(&self) -> AuthResult<Jwks> {
        Ok(self.public_key_set())
    }
}

/// Validates bearer tokens against a cached JWKS.
pub struct ResourceValidator {
    issuer: String,
    audience: String,
    source: Arc<dyn JwksSource>,
    keys: ArcSwap<Jwks>,
    last_refresh: Mutex<Option<Instant>>,
}

impl ResourceValidator {
    /// Creates a validator for tokens from `issuer` addressed to `audience`.
    /// The cache starts empty and is filled on first use.
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        source: Arc<dyn JwksSource>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            source,
            keys: ArcSwap::from_pointee(Jwks::default()),
            last_refresh: Mutex::new(None),
        }
    }

    /// The audience this validator requires.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Re-fetches the key set unless that happened very recently.
    ///
    /// Returns `true` if a fetch took place.
    ///
    /// # Errors
    ///
    /// Returns the source's error if the fetch fails.
    pub async fn refresh(&self) -> AuthResult<bool> {
        let mut last = self.last_refresh.lock().await;
        if last.is_some_and(|at| at.elapsed() < MIN_REFRESH_INTERVAL) {
            return Ok(false);
        }

        let jwks = self.source.fetch_jwks().await?;
        tracing::debug!(keys = jwks.keys.len(), "Refreshed JWKS cache");
        self.keys.store(Arc::new(jwks));
        *last = Some(Instant::now());
        Ok(true)
    }

    /// Validates `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// - `ExpiredToken` if `exp` has passed
    /// - `SignatureInvalid` if no published key verifies the signature
    /// - `InvalidToken` for a wrong issuer or audience, or a malformed token
    pub async fn validate(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let header = decode_header(token).map_err(JwtError::from)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_token("token header has no kid"))?;

        let jwk = match self.keys.load().find(&kid).cloned() {
            Some(jwk) => jwk,
            None => {
                self.refresh().await?;
                self.keys
                    .load()
                    .find(&kid)
                    .cloned()
                    .ok_or_else(|| JwtError::key_not_found(&kid))?
            }
        };

        let (key, algorithm) = jwk.to_decoding_key()?;
        if header.alg != algorithm {
            return Err(AuthError::invalid_token(
                "token algorithm does not match the published key",
            ));
        }

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        let data = decode::<AccessTokenClaims>(token, &key, &validation).map_err(JwtError::from)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::OffsetDateTime;

    use super::*;
    use crate::oauth::scope::ScopeSet;
    use crate::storage::MemoryRefreshTokenStore;
    use crate::token::issuer::{TokenIssuer, TokenLifetimes, TokenSubject};
    use crate::token::jwt::SigningKeyPair;

    const ISSUER: &str = "https://localhost:5000";

    struct CountingSource {
        keys: Arc<KeyStore>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl JwksSource for CountingSource {
        async fn fetch_jwks(&self) -> AuthResult<Jwks> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.keys.public_key_set())
        }
    }

    fn setup() -> (Arc<KeyStore>, TokenIssuer) {
        let keys = Arc::new(KeyStore::with_key(
            ISSUER,
            SigningKeyPair::generate_ec().unwrap(),
            time::Duration::hours(1),
        ));
        let issuer = TokenIssuer::new(
            Arc::clone(&keys),
            Arc::new(MemoryRefreshTokenStore::new()),
            TokenLifetimes::default(),
        );
        (keys, issuer)
    }

    fn mint(issuer: &TokenIssuer, ttl: time::Duration) -> String {
        issuer
            .issue_access_token(
                "client",
                &TokenSubject::Client,
                vec!["api1".into()],
                &ScopeSet::parse("api1"),
                ttl,
            )
            .unwrap()
            .token
    }

    #[tokio::test]
    async fn test_validates_against_published_keys() {
        let (keys, issuer) = setup();
        let validator = ResourceValidator::new(ISSUER, "api1", keys);

        let claims = validator
            .validate(&mint(&issuer, time::Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(claims.scope, "api1");
        assert!(claims.exp > OffsetDateTime::now_utc().unix_timestamp());
    }

    #[tokio::test]
    async fn test_rejects_expired_and_foreign_audience() {
        let (keys, issuer) = setup();
        let validator = ResourceValidator::new(ISSUER, "api1", keys.clone());
        assert!(matches!(
            validator.validate(&mint(&issuer, time::Duration::seconds(-5))).await,
            Err(AuthError::ExpiredToken)
        ));

        let other = ResourceValidator::new(ISSUER, "api2", keys);
        assert!(matches!(
            other.validate(&mint(&issuer, time::Duration::hours(1))).await,
            Err(AuthError::InvalidToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_triggers_one_refresh() {
        let (keys, issuer) = setup();
        let source = Arc::new(CountingSource {
            keys: Arc::clone(&keys),
            fetches: AtomicUsize::new(0),
        });
        let validator = ResourceValidator::new(ISSUER, "api1", source.clone());

        validator
            .validate(&mint(&issuer, time::Duration::hours(1)))
            .await
            .unwrap();
        validator
            .validate(&mint(&issuer, time::Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        keys.rotate(SigningKeyPair::generate_ec().unwrap());
        let after_rotation = mint(&issuer, time::Duration::hours(1));
        // The refresh interval has not passed, so the new kid is not visible yet.
        assert!(matches!(
            validator.validate(&after_rotation).await,
            Err(AuthError::SignatureInvalid)
        ));
    }
}
