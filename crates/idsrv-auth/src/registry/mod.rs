//! Client, resource and user registry.
//!
//! The registry exclusively owns client, resource and user records. It is
//! loaded once from a [`RegistrySeed`], validated as a whole, and read-only
//! afterwards, so lookups need no locking.

mod memory;
mod seed;

use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::{Client, ClientValidationError, Resources, User};

pub use memory::InMemoryRegistry;
pub use seed::{ClientSeed, RegistrySeed, UserSeed};

/// Read access to registered clients, users and resources.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Finds an enabled client by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn lookup_client(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Finds a user by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn lookup_user(&self, username: &str) -> AuthResult<Option<User>>;

    /// Finds a user by subject id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn find_user_by_subject(&self, subject_id: &str) -> AuthResult<Option<User>>;

    /// All API and identity resources.
    fn resources(&self) -> Arc<Resources>;

    /// Changes whenever registry contents change. Derived caches key on it.
    fn generation(&self) -> u64;
}

/// Problems found while loading a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two clients share an id.
    #[error("duplicate client id '{client_id}'")]
    DuplicateClient { client_id: String },

    /// Two users share a login name.
    #[error("duplicate username '{username}'")]
    DuplicateUsername { username: String },

    /// Two users share a subject id.
    #[error("duplicate subject id '{subject_id}'")]
    DuplicateSubject { subject_id: String },

    /// Two resources define the same scope.
    #[error("scope '{scope}' is defined by more than one resource")]
    DuplicateScope { scope: String },

    /// A client registration is invalid on its own.
    #[error("client '{client_id}': {source}")]
    InvalidClient {
        client_id: String,
        #[source]
        source: ClientValidationError,
    },

    /// A client may request a scope that no resource defines.
    #[error("client '{client_id}' allows unknown scope '{scope}'")]
    UnknownScope { client_id: String, scope: String },

    /// A seed password could not be hashed.
    #[error("failed to hash password for '{username}': {message}")]
    PasswordHash { username: String, message: String },
}

impl From<RegistryError> for AuthError {
    fn from(err: RegistryError) -> Self {
        AuthError::configuration(err.to_string())
    }
}
