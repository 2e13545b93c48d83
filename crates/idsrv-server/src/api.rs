//! Sample protected resource API and health endpoint.
//!
//! `GET /api/identity` echoes the claims of the presented access token as
//! `[{ "type": ..., "value": ... }]`. It validates tokens against a JWKS only,
//! the same way an API hosted on another machine would.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::get;
use axum::{Json, Router};
use idsrv_auth::discovery::DiscoveryDocument;
use idsrv_auth::middleware::extract_bearer;
use idsrv_auth::token::{JwksSource, Jwks, KeyStore, ResourceValidator};
use idsrv_auth::{AuthError, AuthResult};
use serde::Serialize;
use serde_json::json;

use crate::config::ApiConfig;

pub const IDENTITY_PATH: &str = "/api/identity";

/// One claim of the caller's token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimView {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

/// Fetches the key set from a remote authorization server through its
/// discovery document.
pub struct RemoteJwks {
    http: reqwest::Client,
    authority: String,
}

impl RemoteJwks {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            authority: authority.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl JwksSource for RemoteJwks {
    async fn fetch_jwks(&self) -> AuthResult<Jwks> {
        let discovery_url = format!("{}{}", self.authority, idsrv_auth::discovery::DISCOVERY_PATH);
        let document: DiscoveryDocument = get_json(&self.http, &discovery_url).await?;
        let jwks: Jwks = get_json(&self.http, &document.jwks_uri).await?;
        tracing::debug!(authority = %self.authority, keys = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
) -> AuthResult<T> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| AuthError::key_unavailable(format!("GET {url}: {e}")))?;
    response
        .json()
        .await
        .map_err(|e| AuthError::key_unavailable(format!("GET {url}: {e}")))
}

/// Builds the validator for the sample API.
///
/// With `api.authority` set, keys come from that server over HTTP. Otherwise
/// they are read from this process's key store.
pub fn resource_validator(
    api: &ApiConfig,
    local_issuer: &str,
    keys: Arc<KeyStore>,
) -> ResourceValidator {
    match &api.authority {
        Some(authority) => ResourceValidator::new(
            authority.trim_end_matches('/'),
            api.audience.clone(),
            Arc::new(RemoteJwks::new(authority.clone())),
        ),
        None => ResourceValidator::new(local_issuer, api.audience.clone(), keys),
    }
}

pub fn routes(validator: Arc<ResourceValidator>) -> Router {
    Router::new()
        .route(IDENTITY_PATH, get(identity))
        .route("/healthz", get(healthz))
        .with_state(validator)
}

async fn identity(
    State(validator): State<Arc<ResourceValidator>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ClaimView>>, AuthError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer)
        .ok_or_else(|| AuthError::invalid_token("missing bearer token"))?;

    let claims = validator.validate(token).await.map_err(|e| {
        tracing::debug!(error = %e, audience = validator.audience(), "API token rejected");
        e
    })?;

    Ok(Json(
        claims
            .to_claim_pairs()
            .into_iter()
            .map(|(claim_type, value)| ClaimView { claim_type, value })
            .collect(),
    ))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
