//! UserInfo endpoint (OpenID Connect Core 1.0 §5.3).
//!
//! Returns the claims of the token's subject, filtered by the identity
//! scopes the token carries.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Map, Value};

use crate::error::AuthError;
use crate::middleware::BearerAuth;
use crate::oauth::grant::GrantEngine;
use crate::types::OPENID;

/// `GET|POST /connect/userinfo`
///
/// # Errors
///
/// - `InvalidToken` if the bearer token is missing, invalid or revoked
/// - `AccessDenied` if the token lacks the `openid` scope or has no subject
pub async fn userinfo_handler(
    State(engine): State<Arc<GrantEngine>>,
    BearerAuth(claims): BearerAuth,
) -> Result<Json<Map<String, Value>>, AuthError> {
    if !claims.has_scope(OPENID) {
        return Err(AuthError::access_denied("the openid scope is required"));
    }
    let subject = claims
        .sub
        .as_deref()
        .ok_or_else(|| AuthError::access_denied("token has no subject"))?;

    let user = engine
        .registry()
        .find_user_by_subject(subject)
        .await?
        .ok_or_else(|| AuthError::invalid_token("subject no longer exists"))?;

    let resources = engine.registry().resources();
    let allowed = resources.claims_for(claims.scopes());

    let mut body = user.claims_json(&allowed);
    body.insert("sub".to_string(), Value::String(user.subject_id.clone()));
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use time::Duration;

    use crate::http::test_support::{app, json_body, send, state};
    use crate::oauth::scope::ScopeSet;
    use crate::token::TokenSubject;

    fn get(token: &str) -> Request<Body> {
        Request::get("/connect/userinfo")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_returns_profile_claims() {
        let state = state();
        let token = state
            .engine
            .issuer()
            .issue_access_token(
                "mvc2",
                &TokenSubject::password_user("1", 0),
                vec!["api1".into()],
                &ScopeSet::parse("openid profile api1"),
                Duration::hours(1),
            )
            .unwrap()
            .token;

        let response = send(app(state), get(&token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["sub"], "1");
        assert_eq!(json["name"], "Alice");
    }

    #[tokio::test]
    async fn test_openid_scope_only_returns_sub() {
        let state = state();
        let token = state
            .engine
            .issuer()
            .issue_access_token(
                "mvc2",
                &TokenSubject::password_user("2", 0),
                vec![],
                &ScopeSet::parse("openid"),
                Duration::hours(1),
            )
            .unwrap()
            .token;

        let json = json_body(send(app(state), get(&token)).await).await;
        assert_eq!(json["sub"], "2");
        assert!(json.get("name").is_none());
    }

    #[tokio::test]
    async fn test_client_token_is_forbidden() {
        let state = state();
        let token = state
            .engine
            .issuer()
            .issue_access_token(
                "client",
                &TokenSubject::Client,
                vec!["api1".into()],
                &ScopeSet::parse("api1"),
                Duration::hours(1),
            )
            .unwrap()
            .token;

        let response = send(app(state), get(&token)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let response = send(app(state()), get("not-a-jwt")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
