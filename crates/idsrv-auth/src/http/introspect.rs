//! Token introspection endpoint handler (RFC 7662).
//!
//! # Request Format
//!
//! ```text
//! POST /connect/introspect
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <client_credentials>
//!
//! token=<token_to_introspect>&token_type_hint=access_token
//! ```
//!
//! Returns `{"active": false}` for any token that is not active, without
//! saying why.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};

use crate::error::AuthError;
use crate::http::revoke::RevocationForm;
use crate::http::token::client_credentials_from_headers;
use crate::oauth::client_auth::{PresentedCredentials, authenticate_client};
use crate::oauth::grant::GrantEngine;

/// `POST /connect/introspect`
///
/// Takes the same form as the revocation endpoint.
pub async fn introspect_handler(
    State(engine): State<Arc<GrantEngine>>,
    headers: HeaderMap,
    form: Result<Form<RevocationForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return AuthError::invalid_request(format!("malformed request: {rejection}"))
                .into_response();
        }
    };

    let basic = client_credentials_from_headers(&headers);
    let credentials = PresentedCredentials {
        basic: basic.as_ref().map(|(id, secret)| (id.as_str(), secret.as_str())),
        client_id: form.client_id.as_deref(),
        client_secret: form.client_secret.as_deref(),
    };

    let client = match authenticate_client(credentials, engine.registry().as_ref()).await {
        Ok(authenticated) => authenticated.client,
        Err(e) => return e.into_response(),
    };

    if form.token.is_empty() {
        return AuthError::invalid_request("missing token").into_response();
    }

    match engine
        .introspect(&client, &form.token, form.token_type_hint.as_deref())
        .await
    {
        Ok(response) => ([(header::CACHE_CONTROL, "no-store")], Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}
