//! # idsrv-auth
//!
//! OAuth 2.0 and OpenID Connect authorization server core.
//!
//! This crate provides:
//! - A registry of clients, users and resources
//! - The grant engine: authorization code (with PKCE), implicit, hybrid,
//!   client credentials, resource owner password and refresh token grants
//! - Signed JWT access and identity tokens with key rotation
//! - Discovery document and JWKS publication
//! - Axum handlers for every endpoint
//!
//! ## Modules
//!
//! - [`config`] - Authorization server configuration
//! - [`registry`] - Clients, users and resources
//! - [`oauth`] - Protocol logic and the grant engine
//! - [`token`] - Token minting, signing keys and validation
//! - [`storage`] - Codes, refresh tokens and revocations in flight
//! - [`discovery`] - OpenID Provider metadata
//! - [`middleware`] - Bearer extraction and error responses
//! - [`http`] - Axum HTTP handlers for the endpoints

pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod http;
pub mod middleware;
pub mod oauth;
pub mod registry;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use discovery::{DiscoveryCache, DiscoveryDocument};
pub use error::{AuthError, ErrorCategory};
pub use http::{IdentityServerState, router};
pub use middleware::BearerAuth;
pub use oauth::{GrantEngine, ScopeSet};
pub use registry::{InMemoryRegistry, Registry, RegistrySeed};
pub use token::{KeyStore, ResourceValidator, SigningKeyPair, TokenIssuer, TokenLifetimes};
pub use types::{Client, ClientValidationError, GrantType, RefreshToken, User};

/// Type alias for authorization server results.
pub type AuthResult<T> = Result<T, AuthError>;
