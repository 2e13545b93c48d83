//! Error responses.
//!
//! `AuthError` renders as an OAuth 2.0 error object:
//!
//! ```json
//! { "error": "invalid_grant", "error_description": "..." }
//! ```
//!
//! 401 responses carry a `WWW-Authenticate` challenge. Server-side failures
//! are logged here and reach the client only as `server_error`.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

const REALM: &str = "idsrv";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let error = self.oauth_error_code();
        let description = self.public_description();

        if self.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        if status == StatusCode::UNAUTHORIZED {
            let challenge = build_www_authenticate_header(&self, error, &description);
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        let body = json!({
            "error": error,
            "error_description": description,
        });

        (status, headers, Json(body)).into_response()
    }
}

/// HTTP status for an error.
#[must_use]
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidClient { .. }
        | AuthError::InvalidToken { .. }
        | AuthError::ExpiredToken
        | AuthError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        AuthError::AccessDenied { .. } => StatusCode::FORBIDDEN,
        AuthError::KeyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_server_error() => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Client authentication failures challenge with Basic, token failures with
/// Bearer.
fn build_www_authenticate_header(err: &AuthError, error: &str, description: &str) -> String {
    if matches!(err, AuthError::InvalidClient { .. }) {
        return format!("Basic realm=\"{REALM}\"");
    }
    let escaped = description.replace('\"', "\\\"");
    format!("Bearer realm=\"{REALM}\", error=\"{error}\", error_description=\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_invalid_grant_response() {
        let response = AuthError::invalid_grant("authorization code has already been used")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_grant");
        assert!(
            json["error_description"]
                .as_str()
                .unwrap()
                .contains("already been used")
        );
    }

    #[tokio::test]
    async fn test_invalid_client_challenges_basic() {
        let response = AuthError::invalid_client("Client authentication failed").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert_eq!(challenge, "Basic realm=\"idsrv\"");
    }

    #[tokio::test]
    async fn test_expired_token_challenges_bearer() {
        let response = AuthError::ExpiredToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("Bearer"));
        assert!(challenge.contains("error=\"invalid_token\""));
    }

    #[tokio::test]
    async fn test_server_error_hides_details() {
        let response = AuthError::storage("connection reset by peer").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "server_error");
        assert!(!json["error_description"].as_str().unwrap().contains("peer"));
    }

    #[test]
    fn test_key_unavailable_is_503() {
        assert_eq!(
            status_for(&AuthError::key_unavailable("no key")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_www_authenticate_header_escaping() {
        let err = AuthError::invalid_token("bad");
        let header = build_www_authenticate_header(&err, "invalid_token", "Token has \"quotes\"");
        assert!(header.contains("\\\"quotes\\\""));
    }
}
