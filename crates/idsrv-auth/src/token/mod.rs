//! Token generation, validation, and signing keys.
//!
//! - [`jwt`] - Key pairs, JWK/JWKS, algorithm support
//! - [`keys`] - The key ring: active key, retired keys, rotation
//! - [`claims`] - Access and identity token claim sets
//! - [`issuer`] - Minting access, identity and refresh tokens
//! - [`validator`] - JWKS-based validation for resource APIs

pub mod claims;
pub mod issuer;
pub mod jwt;
pub mod keys;
pub mod validator;

pub use claims::{AccessTokenClaims, IdTokenClaims};
pub use issuer::{
    IdentityTokenRequest, IssuedAccessToken, IssuedRefreshToken, TokenIssuer, TokenLifetimes,
    TokenSubject,
};
pub use jwt::{Jwk, Jwks, JwtError, SigningAlgorithm, SigningKeyPair};
pub use keys::{KeyStore, VerifyOptions};
pub use validator::{JwksSource, ResourceValidator};
