//! Client authentication for the token and revocation endpoints.
//!
//! # Authentication Methods
//!
//! - `client_secret_basic` - HTTP Basic Auth with client_id:client_secret
//! - `client_secret_post` - client_id and client_secret in the form body
//! - `none` - client_id only, for clients registered without
//!   `require_client_secret`
//!
//! HTTP Basic wins when both a header and body credentials are present.
//! Every failure is `invalid_client`; the description never says whether the
//! client exists.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::registry::Registry;
use crate::types::Client;

/// Result of successful client authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// The authenticated client.
    pub client: Client,

    /// The authentication method used.
    pub auth_method: TokenEndpointAuthMethod,
}

/// Token endpoint authentication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// No client authentication (public clients).
    None,

    /// Client secret via HTTP Basic Auth.
    ClientSecretBasic,

    /// Client secret in request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }

    /// Methods advertised in discovery.
    #[must_use]
    pub fn supported() -> [Self; 2] {
        [Self::ClientSecretBasic, Self::ClientSecretPost]
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client credentials as presented on the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentedCredentials<'a> {
    /// Decoded HTTP Basic credentials.
    pub basic: Option<(&'a str, &'a str)>,
    /// `client_id` form field.
    pub client_id: Option<&'a str>,
    /// `client_secret` form field.
    pub client_secret: Option<&'a str>,
}

/// Authenticates the calling client.
///
/// # Errors
///
/// Returns `InvalidClient` if no credentials were presented, the client is
/// unknown or disabled, or the secret does not verify.
pub async fn authenticate_client(
    credentials: PresentedCredentials<'_>,
    registry: &dyn Registry,
) -> AuthResult<AuthenticatedClient> {
    let (client_id, secret, method) = match credentials {
        PresentedCredentials {
            basic: Some((id, secret)),
            ..
        } => (id, Some(secret), TokenEndpointAuthMethod::ClientSecretBasic),
        PresentedCredentials {
            client_id: Some(id),
            client_secret: Some(secret),
            ..
        } => (id, Some(secret), TokenEndpointAuthMethod::ClientSecretPost),
        PresentedCredentials {
            client_id: Some(id),
            ..
        } => (id, None, TokenEndpointAuthMethod::None),
        _ => return Err(AuthError::invalid_client("No client credentials provided")),
    };

    if let (Some(body_id), Some(_)) = (credentials.client_id, credentials.basic) {
        if body_id != client_id {
            return Err(AuthError::invalid_client(
                "client_id in body does not match the authenticated client",
            ));
        }
    }

    let client = registry
        .lookup_client(client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client("Client authentication failed"))?;

    match secret {
        Some(secret) => {
            if !client.verify_secret(secret) {
                tracing::debug!(client_id = %client_id, "Client secret did not verify");
                return Err(AuthError::invalid_client("Client authentication failed"));
            }
        }
        None if client.require_client_secret => {
            return Err(AuthError::invalid_client(
                "Client authentication failed",
            ));
        }
        None => {}
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: method,
    })
}

/// Parses HTTP Basic Auth header value.
///
/// The password part may itself contain colons.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = credentials.split_once(':')?;

    Some((client_id.to_string(), client_secret.to_string()))
}
