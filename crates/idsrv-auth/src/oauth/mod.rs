//! OAuth 2.0 and OpenID Connect protocol logic.
//!
//! - [`authorize`] - Authorization endpoint parameters and redirects
//! - [`token`] - Token endpoint request and response types
//! - [`client_auth`] - Client authentication
//! - [`scope`] - Scope narrowing
//! - [`pkce`] - Proof Key for Code Exchange (S256)
//! - [`code`] - Authorization codes
//! - [`introspection`] - Token introspection responses
//! - [`grant`] - The grant engine

pub mod authorize;
pub mod client_auth;
pub mod code;
pub mod grant;
pub mod introspection;
pub mod pkce;
pub mod scope;
pub mod token;

pub use authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationRequest, AuthorizationResponse,
    ResponseMode, ResponseType,
};
pub use client_auth::{
    AuthenticatedClient, PresentedCredentials, TokenEndpointAuthMethod, authenticate_client,
    parse_basic_auth,
};
pub use code::{AuthorizationCode, CodeState, IssuedTokens, Redemption};
pub use grant::{AuthorizeRejection, GrantEngine, ValidatedAuthorizationRequest};
pub use introspection::IntrospectionResponse;
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use scope::{ScopeAudience, ScopeSet, narrow_scopes};
pub use token::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
