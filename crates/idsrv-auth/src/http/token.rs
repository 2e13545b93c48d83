//! Token endpoint handler.
//!
//! Supported grants:
//!
//! - `authorization_code` - Exchange authorization code for tokens
//! - `refresh_token` - Refresh an access token
//! - `client_credentials` - Machine-to-machine authentication
//! - `password` - Resource Owner Password Credentials (ROPC)
//!
//! # Example
//!
//! ```ignore
//! POST /connect/token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=client_credentials
//! &scope=api1
//! ```

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::oauth::client_auth::{PresentedCredentials, authenticate_client, parse_basic_auth};
use crate::oauth::grant::GrantEngine;
use crate::oauth::token::{TokenRequest, TokenResponse};

/// `POST /connect/token`
///
/// Clients authenticate with HTTP Basic, with `client_id` and
/// `client_secret` in the body, or (public clients) with `client_id` alone.
pub async fn token_handler(
    State(engine): State<Arc<GrantEngine>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let Form(request) = match form {
        Ok(form) => form,
        Err(rejection) => {
            debug!(error = %rejection, "Malformed token request");
            return AuthError::invalid_request(format!("malformed request: {rejection}"))
                .into_response();
        }
    };

    debug!(
        grant_type = %request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

    let basic = client_credentials_from_headers(&headers);
    let credentials = PresentedCredentials {
        basic: basic.as_ref().map(|(id, secret)| (id.as_str(), secret.as_str())),
        client_id: request.client_id.as_deref(),
        client_secret: request.client_secret.as_deref(),
    };

    let client = match authenticate_client(credentials, engine.registry().as_ref()).await {
        Ok(authenticated) => authenticated.client,
        Err(e) => {
            warn!(error = %e, "Client authentication failed");
            return e.into_response();
        }
    };

    match engine.exchange(&request, &client).await {
        Ok(response) => token_success_response(response),
        Err(e) => {
            debug!(client_id = %client.client_id, error = %e, "Token request rejected");
            e.into_response()
        }
    }
}

/// Basic credentials from the `Authorization` header, if any.
pub(crate) fn client_credentials_from_headers(headers: &HeaderMap) -> Option<(String, String)> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth)
}

fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}
