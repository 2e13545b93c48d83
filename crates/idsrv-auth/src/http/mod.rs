//! HTTP handlers for the OAuth 2.0 and OpenID Connect endpoints.
//!
//! # Available Handlers
//!
//! - [`discovery`] - Discovery document and JWKS
//! - [`authorize`] - Authorization endpoint with the login form
//! - [`token`] - Token endpoint
//! - [`userinfo`] - UserInfo endpoint
//! - [`revoke`] - Token revocation (RFC 7009)
//! - [`introspect`] - Token introspection (RFC 7662)
//! - [`endsession`] - End-session endpoint
//!
//! [`router`] mounts all of them at their well-known paths.

pub mod authorize;
pub mod discovery;
pub mod endsession;
pub mod introspect;
pub mod revoke;
pub mod templates;
pub mod token;
pub mod userinfo;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::routing::{get, post};

use crate::discovery::{
    AUTHORIZE_PATH, DISCOVERY_PATH, DiscoveryCache, END_SESSION_PATH, INTROSPECTION_PATH,
    JWKS_PATH, REVOCATION_PATH, TOKEN_PATH, USERINFO_PATH,
};
use crate::oauth::grant::GrantEngine;

pub use authorize::{authorize_get, authorize_post};
pub use discovery::{discovery_handler, jwks_handler};
pub use endsession::endsession_handler;
pub use introspect::introspect_handler;
pub use revoke::revoke_handler;
pub use token::token_handler;
pub use userinfo::userinfo_handler;

/// State shared by all identity server endpoints.
#[derive(Clone)]
pub struct IdentityServerState {
    pub engine: Arc<GrantEngine>,
    pub discovery: Arc<DiscoveryCache>,
}

impl IdentityServerState {
    #[must_use]
    pub fn new(engine: Arc<GrantEngine>, discovery: Arc<DiscoveryCache>) -> Self {
        Self { engine, discovery }
    }
}

impl FromRef<IdentityServerState> for Arc<GrantEngine> {
    fn from_ref(state: &IdentityServerState) -> Self {
        Arc::clone(&state.engine)
    }
}

impl FromRef<IdentityServerState> for Arc<DiscoveryCache> {
    fn from_ref(state: &IdentityServerState) -> Self {
        Arc::clone(&state.discovery)
    }
}

/// Routes for every endpoint, with state applied.
pub fn router(state: IdentityServerState) -> Router {
    Router::new()
        .route(DISCOVERY_PATH, get(discovery_handler))
        .route(JWKS_PATH, get(jwks_handler))
        .route(AUTHORIZE_PATH, get(authorize_get).post(authorize_post))
        .route(TOKEN_PATH, post(token_handler))
        .route(USERINFO_PATH, get(userinfo_handler).post(userinfo_handler))
        .route(REVOCATION_PATH, post(revoke_handler))
        .route(INTROSPECTION_PATH, post(introspect_handler))
        .route(END_SESSION_PATH, get(endsession_handler))
        .with_state(state)
}
