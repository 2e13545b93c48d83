//! Authorization code storage trait.
//!
//! # Atomicity
//!
//! [`CodeStore::redeem`] is a compare-and-set on the code's state. Under any
//! number of concurrent presentations of the same code exactly one call sees
//! `Redemption::Redeemed`; every other call sees `Redemption::Replayed`.
//!
//! Never log code values. Records are keyed by digest.

use async_trait::async_trait;

use crate::AuthResult;
use crate::oauth::code::{AuthorizationCode, IssuedTokens, Redemption};

/// Storage for in-flight authorization codes.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Stores a freshly minted code in state `CodeIssued`.
    ///
    /// # Errors
    ///
    /// Returns an error if a record with the same digest exists or the
    /// store is unavailable.
    async fn insert(&self, code: AuthorizationCode) -> AuthResult<()>;

    /// Atomically moves the code with `code_hash` from `CodeIssued` to
    /// `Redeemed` and returns it.
    ///
    /// An expired code is reported as `Expired` and left for the sweep. A
    /// code that is already `Redeemed` or `TokensIssued` is reported as
    /// `Replayed`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails.
    async fn redeem(&self, code_hash: &str) -> AuthResult<Redemption>;

    /// Moves a `Redeemed` code to `TokensIssued`, recording what was minted
    /// so a later replay can revoke it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn record_issued(&self, code_hash: &str, issued: IssuedTokens) -> AuthResult<()>;

    /// Deletes codes and tombstones that are past their retention.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
