//! Authorization endpoint handlers.
//!
//! # Flow
//!
//! ```text
//! GET /connect/authorize?client_id=...&redirect_uri=...&response_type=...
//!     │
//!     ├─► Validate client and redirect URI (failure → error page)
//!     ├─► Validate the rest (failure → redirect with error)
//!     └─► Show login form
//!
//! POST /connect/authorize (login form)
//!     │
//!     ├─► Re-validate the carried request
//!     ├─► deny → redirect with error=access_denied
//!     ├─► bad credentials → login form again
//!     └─► login → issue code and/or tokens → redirect
//! ```
//!
//! The form echoes the authorization request in hidden fields, so the POST
//! is validated exactly like the GET was.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::http::templates::{render_error_page, render_login_form};
use crate::oauth::authorize::AuthorizationRequest;
use crate::oauth::grant::{AuthorizeRejection, GrantEngine, ValidatedAuthorizationRequest};

/// Login form submission.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(flatten)]
    pub request: AuthorizationRequest,
    /// `login` or `deny`.
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// `GET /connect/authorize`
pub async fn authorize_get(
    State(engine): State<Arc<GrantEngine>>,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    debug!(
        client_id = %request.client_id,
        response_type = %request.response_type,
        "Processing authorization request"
    );

    match engine.validate_authorization_request(&request).await {
        Ok(validated) => login_page(&validated, &request, None),
        Err(rejection) => rejection_response(rejection),
    }
}

/// `POST /connect/authorize`
pub async fn authorize_post(
    State(engine): State<Arc<GrantEngine>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let validated = match engine.validate_authorization_request(&form.request).await {
        Ok(validated) => validated,
        Err(rejection) => return rejection_response(rejection),
    };

    match form.action.as_str() {
        "deny" => {
            info!(client_id = %validated.client.client_id, "User denied authorization");
            let err = AuthError::access_denied("The user denied the request");
            redirect_or_page(validated.error_redirect(&err))
        }
        "login" => login(&engine, validated, &form).await,
        other => {
            let err = AuthError::invalid_request(format!("unknown action '{other}'"));
            redirect_or_page(validated.error_redirect(&err))
        }
    }
}

async fn login(
    engine: &GrantEngine,
    validated: ValidatedAuthorizationRequest,
    form: &LoginForm,
) -> Response {
    let user = match engine
        .verify_user_credentials(&form.username, &form.password)
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(
                client_id = %validated.client.client_id,
                username = %form.username,
                "Login failed"
            );
            return login_page(
                &validated,
                &form.request,
                Some("Invalid username or password"),
            );
        }
        Err(e) => return redirect_or_page(validated.error_redirect(&e)),
    };

    let auth_time = OffsetDateTime::now_utc().unix_timestamp();
    let redirect = match engine.authorize(&validated, &user, auth_time).await {
        Ok(response) => validated.success_redirect(&response),
        Err(e) => validated.error_redirect(&e),
    };
    redirect_or_page(redirect)
}

fn login_page(
    validated: &ValidatedAuthorizationRequest,
    request: &AuthorizationRequest,
    error: Option<&str>,
) -> Response {
    let client_name = if validated.client.client_name.is_empty() {
        validated.client.client_id.as_str()
    } else {
        validated.client.client_name.as_str()
    };
    Html(render_login_form(client_name, request, error)).into_response()
}

fn rejection_response(rejection: AuthorizeRejection) -> Response {
    match rejection {
        AuthorizeRejection::Page(err) => error_page(&err),
        AuthorizeRejection::Redirect {
            redirect_uri,
            mode,
            error,
        } => match error.to_redirect_url(&redirect_uri, mode) {
            Ok(url) => Redirect::to(&url).into_response(),
            Err(e) => error_page(&AuthError::internal(format!("unusable redirect URI: {e}"))),
        },
    }
}

fn redirect_or_page(redirect: Result<String, AuthError>) -> Response {
    match redirect {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => error_page(&e),
    }
}

fn error_page(err: &AuthError) -> Response {
    if err.is_server_error() {
        tracing::error!(error = %err, "Authorization request failed");
    }
    let status = if err.is_server_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    (
        status,
        Html(render_error_page(
            err.oauth_error_code(),
            &err.public_description(),
        )),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};

    use crate::http::test_support::{
        app, basic, form_post, json_body, param, redirect_params, send, state, text_body,
    };
    use crate::oauth::pkce::{PkceChallenge, PkceVerifier};

    const MVC_REDIRECT: &str = "https://localhost:5021/signin-oidc";
    const MVC2_REDIRECT: &str = "https://localhost:5002/signin-oidc";

    fn query(pairs: &[(&str, &str)]) -> String {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        format!("/connect/authorize?{encoded}")
    }

    #[tokio::test]
    async fn test_unknown_client_renders_error_page() {
        let uri = query(&[
            ("client_id", "nobody"),
            ("redirect_uri", MVC_REDIRECT),
            ("response_type", "id_token"),
            ("scope", "openid"),
        ]);
        let response = send(app(state()), Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!response.headers().contains_key(header::LOCATION));
        assert!(text_body(response).await.contains("invalid_client"));
    }

    #[tokio::test]
    async fn test_unregistered_redirect_is_never_followed() {
        let uri = query(&[
            ("client_id", "mvc"),
            ("redirect_uri", "https://evil.example/cb"),
            ("response_type", "id_token"),
            ("scope", "openid"),
            ("nonce", "n"),
        ]);
        let response = send(app(state()), Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!response.headers().contains_key(header::LOCATION));
    }

    #[tokio::test]
    async fn test_bad_scope_redirects_with_error() {
        let uri = query(&[
            ("client_id", "mvc"),
            ("redirect_uri", MVC_REDIRECT),
            ("response_type", "id_token"),
            ("scope", "api1"),
            ("nonce", "n"),
            ("state", "xyz"),
        ]);
        let response = send(app(state()), Request::get(uri).body(Body::empty()).unwrap()).await;
        assert!(response.status().is_redirection());

        let params = redirect_params(&response);
        assert_eq!(param(&params, "error"), Some("invalid_scope"));
        assert_eq!(param(&params, "state"), Some("xyz"));
    }

    #[tokio::test]
    async fn test_get_renders_login_form() {
        let uri = query(&[
            ("client_id", "mvc"),
            ("redirect_uri", MVC_REDIRECT),
            ("response_type", "id_token"),
            ("scope", "openid profile"),
            ("nonce", "n"),
        ]);
        let response = send(app(state()), Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = text_body(response).await;
        assert!(html.contains("Sign in to MVC Client"));
        assert!(html.contains("name=\"nonce\" value=\"n\""));
    }

    #[tokio::test]
    async fn test_wrong_password_shows_form_again() {
        let request = form_post(
            "/connect/authorize",
            None,
            &[
                ("client_id", "mvc"),
                ("redirect_uri", MVC_REDIRECT),
                ("response_type", "id_token"),
                ("scope", "openid"),
                ("nonce", "n"),
                ("action", "login"),
                ("username", "alice"),
                ("password", "wrong"),
            ],
        );
        let response = send(app(state()), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text_body(response).await.contains("Invalid username or password"));
    }

    #[tokio::test]
    async fn test_deny_redirects_access_denied() {
        let request = form_post(
            "/connect/authorize",
            None,
            &[
                ("client_id", "mvc"),
                ("redirect_uri", MVC_REDIRECT),
                ("response_type", "id_token"),
                ("scope", "openid"),
                ("nonce", "n"),
                ("state", "s1"),
                ("action", "deny"),
            ],
        );
        let response = send(app(state()), request).await;
        let params = redirect_params(&response);
        assert_eq!(param(&params, "error"), Some("access_denied"));
        assert_eq!(param(&params, "state"), Some("s1"));
    }

    #[tokio::test]
    async fn test_implicit_login_returns_id_token_in_fragment() {
        let request = form_post(
            "/connect/authorize",
            None,
            &[
                ("client_id", "mvc"),
                ("redirect_uri", MVC_REDIRECT),
                ("response_type", "id_token"),
                ("scope", "openid profile"),
                ("nonce", "n"),
                ("state", "abc"),
                ("action", "login"),
                ("username", "alice"),
                ("password", "password"),
            ],
        );
        let response = send(app(state()), request).await;
        assert!(response.status().is_redirection());

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with(&format!("{MVC_REDIRECT}#")));
        let params = redirect_params(&response);
        assert!(param(&params, "id_token").is_some());
        assert_eq!(param(&params, "state"), Some("abc"));
        assert!(param(&params, "code").is_none());
    }

    #[tokio::test]
    async fn test_hybrid_login_then_code_exchange() {
        let state = state();
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);

        let request = form_post(
            "/connect/authorize",
            None,
            &[
                ("client_id", "mvc2"),
                ("redirect_uri", MVC2_REDIRECT),
                ("response_type", "code id_token"),
                ("scope", "openid profile api1 offline_access"),
                ("nonce", "n"),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("action", "login"),
                ("username", "alice"),
                ("password", "password"),
            ],
        );
        let response = send(app(state.clone()), request).await;
        let params = redirect_params(&response);
        let code = param(&params, "code").unwrap().to_string();
        assert!(param(&params, "id_token").is_some());

        let auth = basic("mvc2", "secret");
        let exchange = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", MVC2_REDIRECT),
            ("code_verifier", verifier.as_str()),
        ];
        let response = send(
            app(state.clone()),
            form_post("/connect/token", Some(&auth), &exchange),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let tokens = json_body(response).await;
        assert!(tokens["access_token"].is_string());
        assert!(tokens["refresh_token"].is_string());
        assert!(tokens["id_token"].is_string());

        let replay = send(
            app(state),
            form_post("/connect/token", Some(&auth), &exchange),
        )
        .await;
        assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(replay).await["error"], "invalid_grant");
    }
}
