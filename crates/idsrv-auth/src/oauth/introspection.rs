//! Token introspection response (RFC 7662).

use serde::{Deserialize, Serialize};

use crate::token::AccessTokenClaims;
use crate::types::RefreshToken;

/// Introspection result.
///
/// An inactive token carries `active: false` and nothing else, whatever the
/// reason it is inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// `access_token` or `refresh_token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl IntrospectionResponse {
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_access_token(claims: AccessTokenClaims) -> Self {
        Self {
            active: true,
            scope: Some(claims.scope),
            client_id: Some(claims.client_id),
            token_type: Some("access_token".to_string()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            sub: claims.sub,
            aud: Some(claims.aud),
            iss: Some(claims.iss),
            jti: Some(claims.jti),
        }
    }

    #[must_use]
    pub fn from_refresh_token(record: RefreshToken, issuer: &str) -> Self {
        Self {
            active: true,
            scope: Some(record.scope),
            client_id: Some(record.client_id),
            token_type: Some("refresh_token".to_string()),
            exp: Some(record.expires_at.unix_timestamp()),
            iat: Some(record.created_at.unix_timestamp()),
            sub: record.subject,
            aud: None,
            iss: Some(issuer.to_string()),
            jti: None,
        }
    }
}
