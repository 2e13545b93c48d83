//! OAuth 2.0 client registrations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::credentials::verify_client_secret;

// =============================================================================
// Grant Type
// =============================================================================

/// Flows a client may be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow (`response_type=code`).
    AuthorizationCode,
    /// OpenID Connect hybrid flow (`code id_token`, `code token`, ...).
    Hybrid,
    /// Implicit flow, tokens returned in the redirect fragment.
    Implicit,
    /// Client acting on its own behalf.
    ClientCredentials,
    /// Resource owner password credentials.
    Password,
    /// Refresh token exchange.
    RefreshToken,
}

impl GrantType {
    /// Returns the name used in configuration and discovery.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Hybrid => "hybrid",
            Self::Implicit => "implicit",
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a token endpoint `grant_type` value.
    ///
    /// Only back-channel grants are accepted; `hybrid` and `implicit` are
    /// front-channel flows and have no `grant_type` of their own.
    #[must_use]
    pub fn from_token_param(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    /// Returns `true` for flows that redirect back to the client.
    #[must_use]
    pub fn is_redirect_based(&self) -> bool {
        matches!(self, Self::AuthorizationCode | Self::Hybrid | Self::Implicit)
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,

    /// Human-readable display name.
    #[serde(default)]
    pub client_name: String,

    /// SHA-256 hex digests of the client's secrets.
    #[serde(default)]
    pub secret_hashes: Vec<String>,

    /// Flows this client may use.
    pub grant_types: Vec<GrantType>,

    /// Scopes this client may request.
    pub allowed_scopes: BTreeSet<String>,

    /// Redirect URIs, matched exactly.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Post-logout redirect URIs, matched exactly.
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,

    /// Whether the client may request `offline_access` and use refresh tokens.
    #[serde(default)]
    pub allow_offline_access: bool,

    /// Whether authorization requests must carry a PKCE challenge.
    #[serde(default)]
    pub require_pkce: bool,

    /// Whether the token endpoint requires a secret from this client.
    #[serde(default = "default_true")]
    pub require_client_secret: bool,

    /// Access token lifetime override in seconds.
    #[serde(default)]
    pub access_token_lifetime: Option<i64>,

    /// Whether the client is currently enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Client {
    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.trim().is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }

        if self.allowed_scopes.is_empty() {
            return Err(ClientValidationError::EmptyScopes);
        }

        for uri in self
            .redirect_uris
            .iter()
            .chain(&self.post_logout_redirect_uris)
        {
            if !has_scheme(uri) {
                return Err(ClientValidationError::RedirectUriWithoutScheme { uri: uri.clone() });
            }
        }

        if self.grant_types.iter().any(GrantType::is_redirect_based) && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::NoRedirectUris);
        }

        let needs_secret = self
            .grant_types
            .iter()
            .any(|g| matches!(g, GrantType::ClientCredentials | GrantType::Password));
        if needs_secret && self.require_client_secret && self.secret_hashes.is_empty() {
            return Err(ClientValidationError::MissingSecret);
        }

        if self.grant_types.contains(&GrantType::ClientCredentials) && !self.require_client_secret {
            return Err(ClientValidationError::PublicClientCredentials);
        }

        Ok(())
    }

    /// Checks a redirect URI against the registered set (exact match).
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks a post-logout redirect URI against the registered set (exact match).
    #[must_use]
    pub fn is_post_logout_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris
            .iter()
            .any(|allowed| allowed == uri)
    }

    /// Checks if the given scope may be requested by this client.
    ///
    /// `offline_access` is governed by [`Client::allow_offline_access`].
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        if scope == crate::types::OFFLINE_ACCESS {
            return self.allow_offline_access;
        }
        self.allowed_scopes.contains(scope)
    }

    /// Checks if the given grant type is allowed for this client.
    ///
    /// Codes minted by the hybrid flow are redeemed with the
    /// `authorization_code` grant, and the refresh grant follows the
    /// offline-access flag.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        match grant_type {
            GrantType::AuthorizationCode => {
                self.grant_types.contains(&GrantType::AuthorizationCode)
                    || self.grant_types.contains(&GrantType::Hybrid)
            }
            GrantType::RefreshToken => {
                self.allow_offline_access || self.grant_types.contains(&GrantType::RefreshToken)
            }
            other => self.grant_types.contains(&other),
        }
    }

    /// Returns `true` if the client has at least one secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        !self.secret_hashes.is_empty()
    }

    /// Verifies a presented secret.
    #[must_use]
    pub fn verify_secret(&self, secret: &str) -> bool {
        verify_client_secret(secret, &self.secret_hashes)
    }

    /// Returns whether PKCE is required. Public clients always need it.
    #[must_use]
    pub fn requires_pkce(&self) -> bool {
        self.require_pkce || !self.is_confidential()
    }
}

fn has_scheme(uri: &str) -> bool {
    url::Url::parse(uri).is_ok_and(|u| !u.scheme().is_empty())
}

// =============================================================================
// Validation Error
// =============================================================================

/// Problems found in a client registration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// At least one grant type is required.
    #[error("At least one grant type is required")]
    NoGrantTypes,

    /// At least one allowed scope is required.
    #[error("Allowed scopes cannot be empty")]
    EmptyScopes,

    /// A redirect URI has no scheme.
    #[error("Redirect URI has no scheme: {uri}")]
    RedirectUriWithoutScheme {
        /// The offending URI.
        uri: String,
    },

    /// Redirect-based flows require redirect URIs.
    #[error("Redirect-based flows require redirect URIs")]
    NoRedirectUris,

    /// Back-channel grants require a secret.
    #[error("Client credentials and password grants require a client secret")]
    MissingSecret,

    /// Public clients cannot use client_credentials grant.
    #[error("Public clients cannot use client_credentials grant")]
    PublicClientCredentials,
}

// =============================================================================
// Tests
// =============================================================================
