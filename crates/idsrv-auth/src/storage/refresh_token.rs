//! Refresh token storage trait.
//!
//! Records are keyed by the SHA-256 digest of the token value. Rotation is a
//! single atomic step: the presented token is revoked only if it is still
//! valid, so two concurrent refreshes with the same token cannot both win.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{MintedAccessToken, RefreshToken};

/// Storage for refresh token records.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Stores a new refresh token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn insert(&self, token: RefreshToken) -> AuthResult<()>;

    /// Finds a record by token digest, regardless of expiry or revocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Revokes `old_hash` and stores `replacement` in one step.
    ///
    /// Returns the record that was rotated out.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` if the old token is unknown, expired or
    /// already revoked (including by a concurrent rotation).
    async fn rotate(&self, old_hash: &str, replacement: RefreshToken) -> AuthResult<RefreshToken>;

    /// Revokes a token. Returns `false` if no such token exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn revoke(&self, token_hash: &str) -> AuthResult<bool>;

    /// Remembers an access token minted by redeeming `token_hash`. Entries
    /// that have already expired are dropped on the way.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn record_access_token(
        &self,
        token_hash: &str,
        minted: MintedAccessToken,
    ) -> AuthResult<()>;

    /// Revokes every token of a lineage and returns all of its records,
    /// including ones that were already rotated out.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn revoke_lineage(&self, lineage: &str) -> AuthResult<Vec<RefreshToken>>;

    /// Revokes every token issued to `client_id`. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn revoke_by_client(&self, client_id: &str) -> AuthResult<u64>;

    /// Deletes expired records (revoked ones included once they expire).
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
