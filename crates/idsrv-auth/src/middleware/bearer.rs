//! Bearer token extraction for this server's own protected endpoints.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::oauth::grant::GrantEngine;
use crate::token::AccessTokenClaims;

/// Axum extractor that validates `Authorization: Bearer <token>`.
///
/// The token must carry a valid signature from this server, must not be
/// expired, and must not be on the revocation list. No audience is required;
/// handlers check scopes themselves.
///
/// # Example
///
/// ```ignore
/// async fn handler(BearerAuth(claims): BearerAuth) -> impl IntoResponse {
///     if !claims.has_scope("openid") {
///         return Err(AuthError::access_denied("openid scope required"));
///     }
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuth(pub AccessTokenClaims);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    Arc<GrantEngine>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let engine = Arc::<GrantEngine>::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer)
            .ok_or_else(|| AuthError::invalid_token("missing bearer token"))?;

        let claims = engine.validate_bearer(token, None).await.map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            e
        })?;

        tracing::debug!(
            client_id = %claims.client_id,
            subject = claims.sub.as_deref().unwrap_or("-"),
            "Bearer token accepted"
        );
        Ok(Self(claims))
    }
}

/// Returns the token of a `Bearer` authorization header value.
///
/// The scheme is matched case-insensitively.
#[must_use]
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
