//! End-session endpoint (OpenID Connect RP-Initiated Logout).
//!
//! The server keeps no login session, so ending one only decides where the
//! browser goes next: back to the client when the `id_token_hint` names it
//! and the `post_logout_redirect_uri` is registered, otherwise to a
//! signed-out page.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::http::templates::render_signed_out_page;
use crate::oauth::grant::GrantEngine;

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionRequest {
    #[serde(default)]
    pub id_token_hint: Option<String>,
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// `GET /connect/endsession`
pub async fn endsession_handler(
    State(engine): State<Arc<GrantEngine>>,
    Query(request): Query<EndSessionRequest>,
) -> Response {
    match post_logout_redirect(&engine, &request).await {
        Some(url) => Redirect::to(&url).into_response(),
        None => Html(render_signed_out_page()).into_response(),
    }
}

async fn post_logout_redirect(engine: &GrantEngine, request: &EndSessionRequest) -> Option<String> {
    let redirect_uri = request.post_logout_redirect_uri.as_deref()?;
    let hint = request.id_token_hint.as_deref()?;

    let claims = match engine.issuer().validate_identity_token_hint(hint) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring invalid id_token_hint");
            return None;
        }
    };

    let client = engine.registry().lookup_client(&claims.aud).await.ok()??;
    if !client.is_post_logout_redirect_uri_allowed(redirect_uri) {
        tracing::warn!(
            client_id = %client.client_id,
            redirect_uri = %redirect_uri,
            "Post-logout redirect URI is not registered"
        );
        return None;
    }

    let mut url = url::Url::parse(redirect_uri).ok()?;
    if let Some(state) = &request.state {
        url.query_pairs_mut().append_pair("state", state);
    }
    tracing::info!(client_id = %client.client_id, subject = %claims.sub, "Session ended");
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};

    use crate::http::test_support::{app, send, state, text_body};
    use crate::token::IdentityTokenRequest;

    const POST_LOGOUT: &str = "https://localhost:5002/signout-callback-oidc";

    fn uri(pairs: &[(&str, &str)]) -> String {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        format!("/connect/endsession?{encoded}")
    }

    fn id_token(state: &crate::http::IdentityServerState, client_id: &str) -> String {
        state
            .engine
            .issuer()
            .issue_identity_token(IdentityTokenRequest {
                subject_id: "1",
                client_id,
                auth_time: 0,
                ..Default::default()
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_redirects_to_registered_uri_with_state() {
        let state = state();
        let hint = id_token(&state, "mvc2");
        let request = Request::get(uri(&[
            ("id_token_hint", hint.as_str()),
            ("post_logout_redirect_uri", POST_LOGOUT),
            ("state", "bye"),
        ]))
        .body(Body::empty())
        .unwrap();

        let response = send(app(state), request).await;
        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("{POST_LOGOUT}?state=bye")
        );
    }

    #[tokio::test]
    async fn test_uri_of_another_client_is_not_followed() {
        let state = state();
        let hint = id_token(&state, "mvc");
        let request = Request::get(uri(&[
            ("id_token_hint", hint.as_str()),
            ("post_logout_redirect_uri", POST_LOGOUT),
        ]))
        .body(Body::empty())
        .unwrap();

        let response = send(app(state), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text_body(response).await.contains("logged out"));
    }

    #[tokio::test]
    async fn test_without_hint_shows_signed_out_page() {
        let request = Request::get(uri(&[("post_logout_redirect_uri", POST_LOGOUT)]))
            .body(Body::empty())
            .unwrap();
        let response = send(app(state()), request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
