//! Error types for the authorization server.
//!
//! Every failure a grant, endpoint or token operation can produce is one of
//! the [`AuthError`] variants. Each variant maps to exactly one OAuth 2.0
//! error code so handlers never have to invent wire errors on their own.

use std::fmt;

/// Errors produced by registry lookups, grant processing and token handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Client authentication failed or the client is not registered.
    #[error("client rejected: {message}")]
    InvalidClient {
        message: String,
    },

    /// The authorization code or refresh token is invalid, expired, revoked
    /// or was already redeemed.
    #[error("grant rejected: {message}")]
    InvalidGrant {
        message: String,
    },

    /// No requested scope survived narrowing against the client's allowed set.
    #[error("scope rejected: {message}")]
    InvalidScope {
        message: String,
    },

    /// The client is registered but may not use the requested grant or
    /// response type.
    #[error("client not permitted: {message}")]
    UnauthorizedClient {
        message: String,
    },

    /// The redirect URI is missing or does not exactly match a registered one.
    #[error("redirect_uri not registered: {redirect_uri}")]
    InvalidRedirectUri {
        redirect_uri: String,
    },

    /// A bearer token is malformed, has the wrong audience, or was revoked.
    #[error("bearer token rejected: {message}")]
    InvalidToken {
        message: String,
    },

    /// The token's `exp` claim lies in the past.
    #[error("token has expired")]
    ExpiredToken,

    /// The token signature does not verify against any published key.
    #[error("token signature does not verify")]
    SignatureInvalid,

    /// No active signing key is available.
    #[error("no usable signing key: {message}")]
    KeyUnavailable {
        message: String,
    },

    /// The request is missing a parameter or is otherwise malformed.
    #[error("malformed request: {message}")]
    InvalidRequest {
        message: String,
    },

    /// The resource owner denied the request or failed to authenticate.
    #[error("access denied: {message}")]
    AccessDenied {
        message: String,
    },

    /// The response type is not supported by this server.
    #[error("response_type not supported: {response_type}")]
    UnsupportedResponseType {
        response_type: String,
    },

    /// The grant type is not supported by this server.
    #[error("grant_type not supported: {grant_type}")]
    UnsupportedGrantType {
        grant_type: String,
    },

    /// A code, refresh token or revocation store failed.
    #[error("store failure: {message}")]
    Storage {
        message: String,
    },

    /// The server configuration or registry seed is invalid.
    #[error("bad configuration: {message}")]
    Configuration {
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("internal failure: {message}")]
    Internal {
        message: String,
    },
}

impl AuthError {
    /// Shorthand constructors, one per variant carrying a message.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_redirect_uri(redirect_uri: impl Into<String>) -> Self {
        Self::InvalidRedirectUri {
            redirect_uri: redirect_uri.into(),
        }
    }

    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn key_unavailable(message: impl Into<String>) -> Self {
        Self::KeyUnavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Failures on our side; everything else is the caller's fault.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::KeyUnavailable { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::ExpiredToken | Self::SignatureInvalid
        )
    }

    /// Coarse bucket used as a structured log field.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. } | Self::InvalidGrant { .. } => ErrorCategory::Authentication,
            Self::InvalidScope { .. }
            | Self::UnauthorizedClient { .. }
            | Self::AccessDenied { .. } => ErrorCategory::Authorization,
            Self::InvalidToken { .. } | Self::ExpiredToken | Self::SignatureInvalid => {
                ErrorCategory::Token
            }
            Self::InvalidRedirectUri { .. }
            | Self::InvalidRequest { .. }
            | Self::UnsupportedResponseType { .. }
            | Self::UnsupportedGrantType { .. } => ErrorCategory::Validation,
            Self::KeyUnavailable { .. } => ErrorCategory::KeyMaterial,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// The `error` value sent on the wire.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::InvalidRedirectUri { .. } => "invalid_request",
            Self::InvalidToken { .. } | Self::ExpiredToken | Self::SignatureInvalid => {
                "invalid_token"
            }
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::KeyUnavailable { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the message that is safe to show to a client.
    ///
    /// Server-side failures are collapsed into a generic text so no internal
    /// state leaks through `error_description`.
    #[must_use]
    pub fn public_description(&self) -> String {
        if self.is_server_error() {
            "The server encountered an unexpected condition".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Log bucket for an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    Token,
    Validation,
    KeyMaterial,
    Infrastructure,
    Configuration,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::KeyMaterial => write!(f, "key_material"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
