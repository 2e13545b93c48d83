//! Signing key store with rotation.
//!
//! The store holds one active signing key plus any number of retired keys.
//! Retired keys are no longer used for new signatures but stay published in
//! the JWKS (and accepted by [`KeyStore::verify`]) until every token they
//! signed has expired.
//!
//! The key ring lives behind an [`ArcSwap`], so signing and verification
//! never block on a rotation: an in-flight signature finishes with the key
//! it loaded, and the retired key still verifies it afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use jsonwebtoken::{Header, TokenData, Validation, decode, decode_header, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::jwt::{Jwks, JwtError, SigningKeyPair};

/// Verification expectations for [`KeyStore::verify`].
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Required audience, if any.
    pub audience: Option<String>,
    /// Accept tokens whose `exp` has passed (signature still checked).
    pub allow_expired: bool,
}

impl VerifyOptions {
    /// Require `audience` in the `aud` claim.
    #[must_use]
    pub fn audience(audience: impl Into<String>) -> Self {
        Self {
            audience: Some(audience.into()),
            allow_expired: false,
        }
    }

    /// Skip the expiry check.
    #[must_use]
    pub fn allow_expired() -> Self {
        Self {
            audience: None,
            allow_expired: true,
        }
    }
}

#[derive(Debug, Clone)]
struct RetiredKey {
    key: Arc<SigningKeyPair>,
    verify_until: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
struct KeyRing {
    active: Option<Arc<SigningKeyPair>>,
    retired: Vec<RetiredKey>,
}

impl KeyRing {
    fn find(&self, kid: &str, now: OffsetDateTime) -> Option<&Arc<SigningKeyPair>> {
        if let Some(active) = self.active.as_ref().filter(|k| k.kid == kid) {
            return Some(active);
        }
        self.retired
            .iter()
            .find(|r| r.key.kid == kid && r.verify_until > now)
            .map(|r| &r.key)
    }
}

/// Holds signing keys and publishes their public halves.
#[derive(Debug)]
pub struct KeyStore {
    issuer: String,
    ring: ArcSwap<KeyRing>,
    retention: Duration,
    generation: AtomicU64,
}

impl KeyStore {
    /// Creates an empty store. Signing fails with `KeyUnavailable` until a
    /// key is installed.
    ///
    /// `retention` is how long a retired key remains valid for
    /// verification. It must cover the longest signed-token lifetime.
    #[must_use]
    pub fn new(issuer: impl Into<String>, retention: Duration) -> Self {
        Self {
            issuer: issuer.into(),
            ring: ArcSwap::from_pointee(KeyRing::default()),
            retention,
            generation: AtomicU64::new(0),
        }
    }

    /// Creates a store with `key` as the active signing key.
    #[must_use]
    pub fn with_key(issuer: impl Into<String>, key: SigningKeyPair, retention: Duration) -> Self {
        let store = Self::new(issuer, retention);
        store.rotate(key);
        store
    }

    /// Returns the issuer every token is signed for.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Counter bumped on every key change. Caches compare it to detect
    /// stale key material.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Makes `key` the active signing key. The previously active key, if
    /// any, is retired and kept for verification for the retention period.
    pub fn rotate(&self, key: SigningKeyPair) {
        let key = Arc::new(key);
        let now = OffsetDateTime::now_utc();
        let verify_until = now + self.retention;

        self.ring.rcu(|ring| {
            let mut next = KeyRing {
                active: Some(Arc::clone(&key)),
                retired: ring
                    .retired
                    .iter()
                    .filter(|r| r.verify_until > now)
                    .cloned()
                    .collect(),
            };
            if let Some(previous) = &ring.active {
                next.retired.push(RetiredKey {
                    key: Arc::clone(previous),
                    verify_until,
                });
            }
            next
        });
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::info!(kid = %key.kid, algorithm = %key.algorithm, "Signing key activated");
    }

    /// Drops retired keys whose retention has passed. Returns how many were
    /// removed.
    pub fn prune_retired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.ring.load().retired.len();
        self.ring.rcu(|ring| KeyRing {
            active: ring.active.clone(),
            retired: ring
                .retired
                .iter()
                .filter(|r| r.verify_until > now)
                .cloned()
                .collect(),
        });
        let removed = before.saturating_sub(self.ring.load().retired.len());
        if removed > 0 {
            self.generation.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(removed, "Pruned retired signing keys");
        }
        removed
    }

    /// Returns the key used for new signatures.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if no key has been installed.
    pub fn current_signing_key(&self) -> AuthResult<Arc<SigningKeyPair>> {
        self.ring
            .load()
            .active
            .clone()
            .ok_or_else(|| AuthError::key_unavailable("no active signing key"))
    }

    /// Returns the public keys accepted for verification.
    #[must_use]
    pub fn public_key_set(&self) -> Jwks {
        let now = OffsetDateTime::now_utc();
        let ring = self.ring.load();
        let mut keys: Vec<_> = ring.active.iter().map(|k| k.to_jwk()).collect();
        keys.extend(
            ring.retired
                .iter()
                .filter(|r| r.verify_until > now)
                .map(|r| r.key.to_jwk()),
        );
        Jwks { keys }
    }

    /// Signs `claims` with the active key as a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if there is no active key.
    pub fn sign<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        let key = self.current_signing_key()?;
        Self::sign_with(&key, claims)
    }

    /// Signs `claims` with a key obtained from [`KeyStore::current_signing_key`].
    ///
    /// Used when something derived from the key (such as `at_hash`) must
    /// match the key that signs the token even if a rotation happens in
    /// between.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if encoding fails.
    pub fn sign_with<T: Serialize>(key: &SigningKeyPair, claims: &T) -> AuthResult<String> {
        let mut header = Header::new(key.algorithm.to_jwt_algorithm());
        header.kid = Some(key.kid.clone());

        encode(&header, claims, key.encoding_key())
            .map_err(|e| AuthError::from(JwtError::encoding_error(e.to_string())))
    }

    /// Verifies a token signed by this store.
    ///
    /// The `kid` header selects the verification key; tokens without one, or
    /// naming a key that was never published or has been pruned, fail as
    /// `KeyNotFound`.
    ///
    /// # Errors
    ///
    /// Returns the [`JwtError`] describing why verification failed.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        options: &VerifyOptions,
    ) -> Result<TokenData<T>, JwtError> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| JwtError::decoding_error("token header has no kid"))?;

        let ring = self.ring.load();
        let key = ring
            .find(&kid, OffsetDateTime::now_utc())
            .ok_or_else(|| JwtError::key_not_found(&kid))?;

        let mut validation = Validation::new(key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        validation.validate_exp = !options.allow_expired;
        if options.allow_expired {
            validation.required_spec_claims.remove("exp");
        }
        match &options.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        decode(token, key.decoding_key(), &validation).map_err(JwtError::from)
    }
}
