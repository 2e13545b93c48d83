//! Revoked access token storage trait.
//!
//! Access tokens are self-contained, so downstream APIs never consult this
//! list. It is checked by this server's own bearer-protected endpoints
//! (userinfo, the sample API) and kept only until the revoked token would
//! have expired anyway.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage for revoked access token ids (`jti`).
#[async_trait]
pub trait RevokedTokenStore: Send + Sync {
    /// Marks `jti` as revoked until `expires_at`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()>;

    /// Returns `true` if `jti` has been revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn is_revoked(&self, jti: &str) -> AuthResult<bool>;

    /// Deletes records whose token would have expired by now.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
