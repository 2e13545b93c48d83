//! Token revocation endpoint handler (RFC 7009).
//!
//! # Request Format
//!
//! ```text
//! POST /connect/revocation
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <client_credentials>
//!
//! token=<token_to_revoke>&token_type_hint=refresh_token
//! ```
//!
//! # Response
//!
//! The endpoint answers 200 OK for unknown and already revoked tokens. Only
//! client authentication failures and malformed requests are errors.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::error::AuthError;
use crate::http::token::client_credentials_from_headers;
use crate::oauth::client_auth::{PresentedCredentials, authenticate_client};
use crate::oauth::grant::GrantEngine;

/// Form parameters for the revocation endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RevocationForm {
    /// The token to revoke.
    #[serde(default)]
    pub token: String,

    /// `access_token` or `refresh_token`. Only changes lookup order.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

/// `POST /connect/revocation`
pub async fn revoke_handler(
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
        Err(e) => {
            tracing::warn!(error = %e, "Revocation client authentication failed");
            return e.into_response();
        }
    };

    if form.token.is_empty() {
        return AuthError::invalid_request("missing token").into_response();
    }

    match engine
        .revoke_token(&client, &form.token, form.token_type_hint.as_deref())
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tokio_test::assert_err;

    use crate::http::test_support::{app, basic, form_post, json_body, send, state};

    async fn password_tokens(
        state: &crate::http::IdentityServerState,
        scope: &str,
    ) -> serde_json::Value {
        let response = send(
            app(state.clone()),
            form_post(
                "/connect/token",
                Some(&basic("ro.client", "secret")),
                &[
                    ("grant_type", "password"),
                    ("username", "bob"),
                    ("password", "password"),
                    ("scope", scope),
                ],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    #[tokio::test]
    async fn test_unknown_token_is_ok() {
        let response = send(
            app(state()),
            form_post(
                "/connect/revocation",
                Some(&basic("client", "secret")),
                &[("token", "never-issued")],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_invalid_request() {
        let response = send(
            app(state()),
            form_post("/connect/revocation", Some(&basic("client", "secret")), &[]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_requires_client_authentication() {
        let response = send(
            app(state()),
            form_post("/connect/revocation", None, &[("token", "abc")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_revoked_access_token_fails_validation() {
        let state = state();
        let tokens = password_tokens(&state, "api1").await;
        let access = tokens["access_token"].as_str().unwrap();

        let response = send(
            app(state.clone()),
            form_post(
                "/connect/revocation",
                Some(&basic("ro.client", "secret")),
                &[("token", access), ("token_type_hint", "access_token")],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let err = assert_err!(state.engine.validate_bearer(access, None).await);
        assert_eq!(err.oauth_error_code(), "invalid_token");
    }
}
