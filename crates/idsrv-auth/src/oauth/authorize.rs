//! Authorization endpoint request and response types.
//!
//! # Response types
//!
//! | `response_type`        | Flow               | Delivered in |
//! |------------------------|--------------------|--------------|
//! | `code`                 | authorization code | query        |
//! | `id_token`             | implicit           | fragment     |
//! | `id_token token`       | implicit           | fragment     |
//! | `token`                | implicit           | fragment     |
//! | `code id_token`        | hybrid             | fragment     |
//! | `code token`           | hybrid             | fragment     |
//! | `code id_token token`  | hybrid             | fragment     |
//!
//! Responses carrying tokens are never put in the query string.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::GrantType;

/// Authorization request parameters, from the query string of
/// `GET /connect/authorize` or the hidden fields of the login form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Client identifier.
    #[serde(default)]
    pub client_id: String,

    /// Redirect URI, matched exactly against the registration.
    #[serde(default)]
    pub redirect_uri: String,

    /// Space-separated response type tokens.
    #[serde(default)]
    pub response_type: String,

    /// Space-separated requested scopes.
    #[serde(default)]
    pub scope: String,

    /// Opaque client state, echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// OpenID Connect nonce, copied into the identity token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// PKCE challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method. Only `S256` is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// `query` or `fragment`. Defaults per response type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
}

/// A parsed `response_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Code,
    IdToken,
    IdTokenToken,
    Token,
    CodeIdToken,
    CodeToken,
    CodeIdTokenToken,
}

impl ResponseType {
    /// Parses a space-separated response type. Token order does not matter.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedResponseType` for anything not in the table above.
    pub fn parse(value: &str) -> AuthResult<Self> {
        let mut parts: Vec<&str> = value.split_whitespace().collect();
        parts.sort_unstable();
        parts.dedup();

        match parts.as_slice() {
            ["code"] => Ok(Self::Code),
            ["id_token"] => Ok(Self::IdToken),
            ["id_token", "token"] => Ok(Self::IdTokenToken),
            ["token"] => Ok(Self::Token),
            ["code", "id_token"] => Ok(Self::CodeIdToken),
            ["code", "token"] => Ok(Self::CodeToken),
            ["code", "id_token", "token"] => Ok(Self::CodeIdTokenToken),
            _ => Err(AuthError::unsupported_response_type(value)),
        }
    }

    /// Canonical form, as advertised in discovery.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::IdToken => "id_token",
            Self::IdTokenToken => "id_token token",
            Self::Token => "token",
            Self::CodeIdToken => "code id_token",
            Self::CodeToken => "code token",
            Self::CodeIdTokenToken => "code id_token token",
        }
    }

    /// Every supported response type.
    #[must_use]
    pub fn all() -> [Self; 7] {
        [
            Self::Code,
            Self::IdToken,
            Self::IdTokenToken,
            Self::Token,
            Self::CodeIdToken,
            Self::CodeToken,
            Self::CodeIdTokenToken,
        ]
    }

    /// The grant a client must be allowed to use this response type.
    #[must_use]
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::Code => GrantType::AuthorizationCode,
            Self::IdToken | Self::IdTokenToken | Self::Token => GrantType::Implicit,
            Self::CodeIdToken | Self::CodeToken | Self::CodeIdTokenToken => GrantType::Hybrid,
        }
    }

    #[must_use]
    pub fn includes_code(&self) -> bool {
        matches!(
            self,
            Self::Code | Self::CodeIdToken | Self::CodeToken | Self::CodeIdTokenToken
        )
    }

    #[must_use]
    pub fn includes_id_token(&self) -> bool {
        matches!(
            self,
            Self::IdToken | Self::IdTokenToken | Self::CodeIdToken | Self::CodeIdTokenToken
        )
    }

    #[must_use]
    pub fn includes_access_token(&self) -> bool {
        matches!(
            self,
            Self::IdTokenToken | Self::Token | Self::CodeToken | Self::CodeIdTokenToken
        )
    }

    /// OpenID Connect requires a nonce whenever an identity token is
    /// returned from the authorization endpoint.
    #[must_use]
    pub fn requires_nonce(&self) -> bool {
        self.includes_id_token()
    }

    /// Where the response goes when the request names no `response_mode`.
    #[must_use]
    pub fn default_response_mode(&self) -> ResponseMode {
        match self {
            Self::Code => ResponseMode::Query,
            _ => ResponseMode::Fragment,
        }
    }

    /// Resolves the requested `response_mode`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an unknown mode, or for `query` when the
    /// response would carry tokens.
    pub fn response_mode(&self, requested: Option<&str>) -> AuthResult<ResponseMode> {
        let mode = match requested {
            None => return Ok(self.default_response_mode()),
            Some("query") => ResponseMode::Query,
            Some("fragment") => ResponseMode::Fragment,
            Some(other) => {
                return Err(AuthError::invalid_request(format!(
                    "unsupported response_mode '{other}'"
                )));
            }
        };

        if mode == ResponseMode::Query && *self != Self::Code {
            return Err(AuthError::invalid_request(
                "tokens cannot be returned in the query string",
            ));
        }
        Ok(mode)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the authorization response is attached to the redirect URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
        }
    }
}

/// Successful authorization response parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorizationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationResponse {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |name: &'static str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((name, value));
            }
        };
        push("code", self.code.clone());
        push("id_token", self.id_token.clone());
        push("access_token", self.access_token.clone());
        push("token_type", self.token_type.clone());
        push("expires_in", self.expires_in.map(|e| e.to_string()));
        push("scope", self.scope.clone());
        push("state", self.state.clone());
        pairs
    }

    /// Builds the redirect URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` is not a valid URL.
    pub fn to_redirect_url(
        &self,
        redirect_uri: &str,
        mode: ResponseMode,
    ) -> Result<String, url::ParseError> {
        attach(redirect_uri, mode, &self.pairs())
    }
}

/// Authorization error delivered to the client by redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationError {
    pub error: AuthorizationErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationError {
    /// Creates an error with a description.
    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state,
        }
    }

    /// Converts an [`AuthError`] raised while handling a request that
    /// already passed client and redirect URI validation.
    #[must_use]
    pub fn from_auth_error(err: &AuthError, state: Option<String>) -> Self {
        Self::with_description(
            AuthorizationErrorCode::from(err),
            err.public_description(),
            state,
        )
    }

    /// Builds the redirect URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` is not a valid URL.
    pub fn to_redirect_url(
        &self,
        redirect_uri: &str,
        mode: ResponseMode,
    ) -> Result<String, url::ParseError> {
        let mut pairs = vec![("error", self.error.as_str().to_string())];
        if let Some(desc) = &self.error_description {
            pairs.push(("error_description", desc.clone()));
        }
        if let Some(state) = &self.state {
            pairs.push(("state", state.clone()));
        }
        attach(redirect_uri, mode, &pairs)
    }
}

fn attach(
    redirect_uri: &str,
    mode: ResponseMode,
    pairs: &[(&'static str, String)],
) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(redirect_uri)?;
    match mode {
        ResponseMode::Query => {
            let mut query = url.query_pairs_mut();
            for (name, value) in pairs {
                query.append_pair(name, value);
            }
        }
        ResponseMode::Fragment => {
            let mut fragment = form_urlencoded::Serializer::new(String::new());
            for (name, value) in pairs {
                fragment.append_pair(name, value);
            }
            url.set_fragment(Some(&fragment.finish()));
        }
    }
    Ok(url.to_string())
}

/// OAuth 2.0 authorization error codes (RFC 6749 Section 4.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
}

impl AuthorizationErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }
}

impl From<&AuthError> for AuthorizationErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::UnauthorizedClient { .. } | AuthError::InvalidClient { .. } => {
                Self::UnauthorizedClient
            }
            AuthError::AccessDenied { .. } => Self::AccessDenied,
            AuthError::UnsupportedResponseType { .. } => Self::UnsupportedResponseType,
            AuthError::InvalidScope { .. } => Self::InvalidScope,
            AuthError::KeyUnavailable { .. } => Self::TemporarilyUnavailable,
            e if e.is_server_error() => Self::ServerError,
            _ => Self::InvalidRequest,
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_request_deserialize() {
        let json = r#"{
            "client_id": "mvc2",
            "redirect_uri": "https://localhost:5002/signin-oidc",
            "response_type": "code id_token",
            "scope": "openid api1",
            "state": "xyz",
            "nonce": "n1",
            "code_challenge": "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            "code_challenge_method": "S256"
        }"#;

        let request: AuthorizationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.client_id, "mvc2");
        assert_eq!(request.redirect_uri, "https://localhost:5002/signin-oidc");
        assert_eq!(request.state.as_deref(), Some("xyz"));
        assert!(request.response_mode.is_none());
        assert_eq!(
            ResponseType::parse(&request.response_type).unwrap(),
            ResponseType::CodeIdToken
        );
    }

    #[test]
    fn test_response_type_parsing_ignores_order() {
        assert_eq!(
            ResponseType::parse("token id_token").unwrap(),
            ResponseType::IdTokenToken
        );
        assert_eq!(
            ResponseType::parse("id_token token code").unwrap(),
            ResponseType::CodeIdTokenToken
        );
        assert!(matches!(
            ResponseType::parse("code device"),
            Err(AuthError::UnsupportedResponseType { .. })
        ));
        assert!(ResponseType::parse("").is_err());
    }

    #[test]
    fn test_response_type_flows() {
        assert_eq!(ResponseType::Code.grant_type(), GrantType::AuthorizationCode);
        assert_eq!(ResponseType::IdTokenToken.grant_type(), GrantType::Implicit);
        assert_eq!(ResponseType::CodeIdToken.grant_type(), GrantType::Hybrid);
        assert!(ResponseType::CodeIdToken.requires_nonce());
        assert!(!ResponseType::Code.requires_nonce());
    }

    #[test]
    fn test_query_mode_rejected_for_tokens() {
        assert_eq!(
            ResponseType::Code.response_mode(None).unwrap(),
            ResponseMode::Query
        );
        assert_eq!(
            ResponseType::Code.response_mode(Some("fragment")).unwrap(),
            ResponseMode::Fragment
        );
        assert!(ResponseType::CodeIdToken.response_mode(Some("query")).is_err());
        assert!(ResponseType::Code.response_mode(Some("form_post")).is_err());
    }

    #[test]
    fn test_code_response_in_query() {
        let response = AuthorizationResponse {
            code: Some("abc".into()),
            state: Some("s 1".into()),
            ..Default::default()
        };
        let url = response
            .to_redirect_url("https://localhost:5002/signin-oidc", ResponseMode::Query)
            .unwrap();
        assert_eq!(url, "https://localhost:5002/signin-oidc?code=abc&state=s+1");
    }

    #[test]
    fn test_hybrid_response_in_fragment() {
        let response = AuthorizationResponse {
            code: Some("abc".into()),
            id_token: Some("eyJ.x.y".into()),
            state: Some("xyz".into()),
            ..Default::default()
        };
        let url = url::Url::parse(
            &response
                .to_redirect_url("https://localhost:5002/signin-oidc", ResponseMode::Fragment)
                .unwrap(),
        )
        .unwrap();

        assert!(url.query().is_none());
        let fragment: Vec<(String, String)> =
            form_urlencoded::parse(url.fragment().unwrap().as_bytes())
                .into_owned()
                .collect();
        assert_eq!(
            fragment,
            vec![
                ("code".to_string(), "abc".to_string()),
                ("id_token".to_string(), "eyJ.x.y".to_string()),
                ("state".to_string(), "xyz".to_string()),
            ]
        );
    }

    #[test]
    fn test_error_redirect() {
        let error = AuthorizationError::from_auth_error(
            &AuthError::access_denied("user declined"),
            Some("xyz".into()),
        );
        let url = error
            .to_redirect_url("https://localhost:5021/signin-oidc", ResponseMode::Fragment)
            .unwrap();
        assert!(url.starts_with("https://localhost:5021/signin-oidc#error=access_denied"));
        assert!(url.ends_with("&state=xyz"));
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            AuthorizationErrorCode::from(&AuthError::invalid_scope("x")),
            AuthorizationErrorCode::InvalidScope
        );
        assert_eq!(
            AuthorizationErrorCode::from(&AuthError::storage("x")),
            AuthorizationErrorCode::ServerError
        );
        assert_eq!(
            AuthorizationErrorCode::from(&AuthError::key_unavailable("x")),
            AuthorizationErrorCode::TemporarilyUnavailable
        );
    }
}
