//! Token endpoint request and response types.
//!
//! Four grants are accepted: `client_credentials`, `password`,
//! `authorization_code` (redeeming a code from the code or hybrid flow) and
//! `refresh_token`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;

/// Form body of a `POST /connect/token` call.
///
/// Which fields are required depends on `grant_type`:
///
/// - `client_credentials`: scope is optional
/// - `password`: username, password, (optional) scope
/// - `authorization_code`: code, redirect_uri, code_verifier when PKCE was used
/// - `refresh_token`: refresh_token, scope may narrow
///
/// Clients authenticate with HTTP Basic (not in this struct) or with
/// `client_id` + `client_secret` in the body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// For `refresh_token` this may only narrow the originally granted scope.
    pub scope: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Successful token response.
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "openid api1 offline_access",
///   "refresh_token": "q8nM...",
///   "id_token": "eyJhbG..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the access token's `exp`.
    pub expires_in: u64,
    pub scope: String,

    /// Present only when the grant carried `offline_access`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// A bearer response without refresh or identity tokens.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
            id_token: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_id_token(mut self, token: String) -> Self {
        self.id_token = Some(token);
        self
    }
}

/// Token error response (RFC 6749 Section 5.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenError {
    pub error: TokenErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }
}

impl From<&AuthError> for TokenError {
    fn from(err: &AuthError) -> Self {
        let code = match err {
            AuthError::InvalidClient { .. } => TokenErrorCode::InvalidClient,
            AuthError::InvalidGrant { .. } => TokenErrorCode::InvalidGrant,
            AuthError::UnauthorizedClient { .. } => TokenErrorCode::UnauthorizedClient,
            AuthError::UnsupportedGrantType { .. } => TokenErrorCode::UnsupportedGrantType,
            AuthError::InvalidScope { .. } => TokenErrorCode::InvalidScope,
            e if e.is_server_error() => TokenErrorCode::ServerError,
            _ => TokenErrorCode::InvalidRequest,
        };
        Self::with_description(code, err.public_description())
    }
}

/// `error` values the token endpoint can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    InvalidRequest,
    InvalidClient,

    /// The code or refresh token is invalid, expired, revoked, replayed, or
    /// was issued to another client.
    InvalidGrant,

    UnauthorizedClient,
    UnsupportedGrantType,
    /// Nothing requested survived scope narrowing.
    InvalidScope,
    ServerError,
}

impl TokenErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InvalidScope => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_deserialization() {
        let json = r#"{
            "grant_type": "authorization_code",
            "code": "SplxlOBeZQQYbYS6WxSbIA",
            "redirect_uri": "https://localhost:5002/signin-oidc",
            "code_verifier": "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "client_id": "mvc2"
        }"#;

        let request: TokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.grant_type, "authorization_code");
        assert_eq!(request.code.as_deref(), Some("SplxlOBeZQQYbYS6WxSbIA"));
        assert_eq!(request.client_id.as_deref(), Some("mvc2"));
        assert!(request.client_secret.is_none());
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_token_request_password_grant() {
        let json = r#"{
            "grant_type": "password",
            "username": "alice",
            "password": "password",
            "scope": "api1"
        }"#;

        let request: TokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.username.as_deref(), Some("alice"));
        assert_eq!(request.scope.as_deref(), Some("api1"));
    }

    #[test]
    fn test_token_response_omits_absent_tokens() {
        let response = TokenResponse::new("at".into(), 3600, "api1".into());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("id_token").is_none());

        let json = serde_json::to_value(
            response
                .with_refresh_token("rt".into())
                .with_id_token("it".into()),
        )
        .unwrap();
        assert_eq!(json["refresh_token"], "rt");
        assert_eq!(json["id_token"], "it");
    }

    #[test]
    fn test_error_from_auth_error() {
        let err = TokenError::from(&AuthError::invalid_grant("code already used"));
        assert_eq!(err.error, TokenErrorCode::InvalidGrant);
        assert_eq!(err.error.http_status(), 400);

        let err = TokenError::from(&AuthError::invalid_client("bad secret"));
        assert_eq!(err.error.http_status(), 401);

        let err = TokenError::from(&AuthError::storage("connection reset"));
        assert_eq!(err.error, TokenErrorCode::ServerError);
        assert!(!err.error_description.unwrap().contains("connection reset"));

        let err = TokenError::from(&AuthError::invalid_redirect_uri("https://evil"));
        assert_eq!(err.error, TokenErrorCode::InvalidRequest);
    }
}
