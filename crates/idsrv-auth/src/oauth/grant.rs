//! Grant engine.
//!
//! Runs every grant the server supports, from a validated request to the
//! tokens that answer it:
//!
//! - token endpoint: `client_credentials`, `password`, `authorization_code`
//!   and `refresh_token`
//! - authorization endpoint: `code`, implicit and hybrid response types
//!
//! The engine never sees HTTP. Handlers authenticate the client (token
//! endpoint) or the resource owner (login form) and hand over the result.
//!
//! # Code lifecycle
//!
//! A code moves `CodeIssued -> Redeemed -> TokensIssued` inside the
//! [`CodeStore`]. Redemption is a single atomic step, so exactly one of any
//! number of concurrent presentations wins. Every later presentation is a
//! replay: it fails with `invalid_grant` and revokes what the first
//! redemption issued.

use std::sync::Arc;

use serde_json::Map;
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::authorize::{
    AuthorizationError, AuthorizationRequest, AuthorizationResponse, ResponseMode, ResponseType,
};
use crate::oauth::code::{AuthorizationCode, IssuedTokens, Redemption};
use crate::oauth::introspection::IntrospectionResponse;
use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
use crate::oauth::scope::{ScopeAudience, ScopeSet, narrow_scopes};
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::registry::Registry;
use crate::storage::{CodeStore, RefreshTokenStore, RevokedTokenStore};
use crate::token::{AccessTokenClaims, IdentityTokenRequest, TokenIssuer, TokenSubject};
use crate::types::{Client, GrantType, MintedAccessToken, RefreshToken, User};

/// An authorization request that passed validation.
///
/// From here on every failure can be reported to the client by redirect.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorizationRequest {
    pub client: Client,
    pub redirect_uri: String,
    pub response_type: ResponseType,
    pub response_mode: ResponseMode,
    pub scopes: ScopeSet,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<PkceChallenge>,
}

impl ValidatedAuthorizationRequest {
    /// Redirect URL carrying a successful response.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the registered redirect URI does not parse.
    pub fn success_redirect(&self, response: &AuthorizationResponse) -> AuthResult<String> {
        response
            .to_redirect_url(&self.redirect_uri, self.response_mode)
            .map_err(|e| AuthError::internal(format!("unusable redirect URI: {e}")))
    }

    /// Redirect URL carrying `err`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the registered redirect URI does not parse.
    pub fn error_redirect(&self, err: &AuthError) -> AuthResult<String> {
        AuthorizationError::from_auth_error(err, self.state.clone())
            .to_redirect_url(&self.redirect_uri, self.response_mode)
            .map_err(|e| AuthError::internal(format!("unusable redirect URI: {e}")))
    }
}

/// Why an authorization request was refused.
#[derive(Debug)]
pub enum AuthorizeRejection {
    /// The client or redirect URI could not be trusted. Rendered as an error
    /// page and never redirected.
    Page(AuthError),
    /// Sent back to the client at its registered redirect URI.
    Redirect {
        redirect_uri: String,
        mode: ResponseMode,
        error: AuthorizationError,
    },
}

impl AuthorizeRejection {
    fn redirect(
        redirect_uri: &str,
        mode: ResponseMode,
        err: &AuthError,
        state: Option<String>,
    ) -> Self {
        tracing::debug!(error = %err, "Rejecting authorization request by redirect");
        Self::Redirect {
            redirect_uri: redirect_uri.to_string(),
            mode,
            error: AuthorizationError::from_auth_error(err, state),
        }
    }
}

/// Runs grants and mints the resulting tokens.
pub struct GrantEngine {
    registry: Arc<dyn Registry>,
    issuer: Arc<TokenIssuer>,
    codes: Arc<dyn CodeStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    revoked: Arc<dyn RevokedTokenStore>,
    rotate_refresh_tokens: bool,
}

impl GrantEngine {
    /// Creates an engine. Refresh tokens are rotated on use by default.
    #[must_use]
    pub fn new(
        registry: Arc<dyn Registry>,
        issuer: Arc<TokenIssuer>,
        codes: Arc<dyn CodeStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        revoked: Arc<dyn RevokedTokenStore>,
    ) -> Self {
        Self {
            registry,
            issuer,
            codes,
            refresh_tokens,
            revoked,
            rotate_refresh_tokens: true,
        }
    }

    /// Sets whether a refresh token is replaced each time it is used.
    #[must_use]
    pub fn with_refresh_token_rotation(mut self, rotate: bool) -> Self {
        self.rotate_refresh_tokens = rotate;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    #[must_use]
    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    // ---- token endpoint ----

    /// Runs the grant named by `request.grant_type` for an authenticated
    /// client.
    ///
    /// # Errors
    ///
    /// - `UnsupportedGrantType` for a grant this server does not implement
    /// - `UnauthorizedClient` if the client may not use the grant
    /// - `InvalidGrant`, `InvalidScope` or `InvalidRequest` from the grant
    /// - `KeyUnavailable` if no signing key is active
    pub async fn exchange(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        if request.grant_type.is_empty() {
            return Err(AuthError::invalid_request("missing grant_type"));
        }
        let grant_type = GrantType::from_token_param(&request.grant_type)
            .ok_or_else(|| AuthError::unsupported_grant_type(&request.grant_type))?;

        if !client.is_grant_type_allowed(grant_type) {
            return Err(AuthError::unauthorized_client(format!(
                "client '{}' may not use the {} grant",
                client.client_id, grant_type
            )));
        }

        let result = match grant_type {
            GrantType::ClientCredentials => self.client_credentials(request, client),
            GrantType::Password => self.password(request, client).await,
            GrantType::AuthorizationCode => self.authorization_code(request, client).await,
            GrantType::RefreshToken => self.refresh(request, client).await,
            GrantType::Hybrid | GrantType::Implicit => {
                Err(AuthError::unsupported_grant_type(grant_type.as_str()))
            }
        };

        match &result {
            Ok(response) => tracing::info!(
                client_id = %client.client_id,
                grant_type = %grant_type,
                scope = %response.scope,
                "Token request granted"
            ),
            Err(e) => tracing::info!(
                client_id = %client.client_id,
                grant_type = %grant_type,
                error = e.oauth_error_code(),
                "Token request refused"
            ),
        }
        result
    }

    fn client_credentials(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        let resources = self.registry.resources();
        let scopes = narrow_scopes(
            &requested_scopes(request),
            client,
            &resources,
            ScopeAudience::Client,
        )?;

        let access = self.issuer.issue_access_token(
            &client.client_id,
            &TokenSubject::Client,
            self.issuer.audience_for(&resources, &scopes),
            &scopes,
            self.access_token_lifetime(client),
        )?;

        Ok(TokenResponse::new(access.token, access.expires_in, scopes.to_string()))
    }

    async fn password(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        let username = required(request.username.as_deref(), "username")?;
        let password = required(request.password.as_deref(), "password")?;

        let user = self
            .verify_user_credentials(username, password)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("invalid username or password"))?;

        let resources = self.registry.resources();
        let scopes = narrow_scopes(
            &requested_scopes(request),
            client,
            &resources,
            ScopeAudience::User,
        )?;

        let subject = TokenSubject::password_user(&user.subject_id, now());
        let access = self.issuer.issue_access_token(
            &client.client_id,
            &subject,
            self.issuer.audience_for(&resources, &scopes),
            &scopes,
            self.access_token_lifetime(client),
        )?;

        let mut response = TokenResponse::new(access.token, access.expires_in, scopes.to_string());
        if scopes.has_offline_access() {
            let refresh = self
                .issuer
                .issue_refresh_token(&client.client_id, &subject, &scopes, None)
                .await?;
            response = response.with_refresh_token(refresh.token);
        }
        Ok(response)
    }

    async fn authorization_code(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> AuthResult<TokenResponse> {
        let code = required(request.code.as_deref(), "code")?;
        let code_hash = AuthorizationCode::hash_code(code);

        let record = match self.codes.redeem(&code_hash).await? {
            Redemption::Redeemed(record) => record,
            Redemption::Replayed { client_id, issued } => {
                self.revoke_replayed(&code_hash, &client_id, issued).await;
                return Err(AuthError::invalid_grant(
                    "authorization code has already been used",
                ));
            }
            Redemption::Expired => {
                return Err(AuthError::invalid_grant("authorization code has expired"));
            }
            Redemption::Unknown => {
                return Err(AuthError::invalid_grant("unknown authorization code"));
            }
        };

        if record.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                issued_to = %record.client_id,
                "Authorization code presented by another client"
            );
            return Err(AuthError::invalid_grant(
                "authorization code was issued to another client",
            ));
        }

        if request.redirect_uri.as_deref() != Some(record.redirect_uri.as_str()) {
            return Err(AuthError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }

        match (&record.code_challenge, request.code_verifier.as_deref()) {
            (Some(challenge), Some(verifier)) => {
                challenge.verify(&PkceVerifier::new(verifier.to_string())?)?;
            }
            (Some(_), None) => {
                return Err(AuthError::invalid_grant("code_verifier is required"));
            }
            (None, Some(_)) => {
                return Err(AuthError::invalid_grant(
                    "code_verifier sent but no code_challenge was recorded",
                ));
            }
            (None, None) => {}
        }

        let resources = self.registry.resources();
        let subject = TokenSubject::password_user(&record.subject, record.auth_time);
        let access = self.issuer.issue_access_token(
            &client.client_id,
            &subject,
            self.issuer.audience_for(&resources, &record.scopes),
            &record.scopes,
            self.access_token_lifetime(client),
        )?;

        let mut response = TokenResponse::new(
            access.token.clone(),
            access.expires_in,
            record.scopes.to_string(),
        );

        let mut refresh_token_expires_at = None;
        if record.scopes.has_offline_access() && client.is_grant_type_allowed(GrantType::RefreshToken)
        {
            let refresh = self
                .issuer
                .issue_refresh_token(
                    &client.client_id,
                    &subject,
                    &record.scopes,
                    Some(code_hash.as_str()),
                )
                .await?;
            refresh_token_expires_at = Some(refresh.expires_at);
            response = response.with_refresh_token(refresh.token);
        }

        if record.scopes.has_openid() {
            let id_token = self.issuer.issue_identity_token(IdentityTokenRequest {
                subject_id: &record.subject,
                client_id: &client.client_id,
                auth_time: record.auth_time,
                nonce: record.nonce.as_deref(),
                claims: Map::new(),
                access_token: Some(&access.token),
                code: None,
            })?;
            response = response.with_id_token(id_token);
        }

        self.codes
            .record_issued(
                &code_hash,
                IssuedTokens {
                    access_token_jti: access.jti,
                    access_token_expires_at: access.expires_at,
                    refresh_token_expires_at,
                },
            )
            .await?;

        Ok(response)
    }

    async fn refresh(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        let presented = required(request.refresh_token.as_deref(), "refresh_token")?;
        let record = self.issuer.resolve_refresh_token(presented).await?;

        if record.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "refresh token was issued to another client",
            ));
        }

        let original = ScopeSet::parse(&record.scope);
        let requested = requested_scopes(request);
        let scopes = if requested.is_empty() {
            original.clone()
        } else {
            let narrowed: ScopeSet = requested.iter().filter(|&s| original.contains(s)).collect();
            if narrowed.is_empty() {
                return Err(AuthError::invalid_scope(
                    "requested scope is not covered by the refresh token",
                ));
            }
            narrowed
        };

        let subject = match &record.subject {
            Some(subject_id) => {
                if self.registry.find_user_by_subject(subject_id).await?.is_none() {
                    return Err(AuthError::invalid_grant("the resource owner no longer exists"));
                }
                TokenSubject::password_user(
                    subject_id,
                    record.auth_time.unwrap_or(record.created_at.unix_timestamp()),
                )
            }
            None => TokenSubject::Client,
        };

        let resources = self.registry.resources();
        let access = self.issuer.issue_access_token(
            &client.client_id,
            &subject,
            self.issuer.audience_for(&resources, &scopes),
            &scopes,
            self.access_token_lifetime(client),
        )?;

        let id_token = match &subject {
            TokenSubject::User {
                subject_id,
                auth_time,
                ..
            } if scopes.has_openid() => Some(self.issuer.issue_identity_token(
                IdentityTokenRequest {
                    subject_id: subject_id.as_str(),
                    client_id: &client.client_id,
                    auth_time: *auth_time,
                    access_token: Some(&access.token),
                    ..Default::default()
                },
            )?),
            _ => None,
        };

        let (refresh_token, refresh_token_hash) = if self.rotate_refresh_tokens {
            let rotated = self.issuer.rotate_refresh_token(&record).await?;
            (rotated.token, rotated.token_hash)
        } else {
            (presented.to_string(), record.token_hash.clone())
        };

        if record.lineage.is_some() {
            self.refresh_tokens
                .record_access_token(
                    &refresh_token_hash,
                    MintedAccessToken {
                        jti: access.jti.clone(),
                        expires_at: access.expires_at,
                    },
                )
                .await?;
        }

        let mut response = TokenResponse::new(access.token, access.expires_in, scopes.to_string())
            .with_refresh_token(refresh_token);
        if let Some(id_token) = id_token {
            response = response.with_id_token(id_token);
        }
        Ok(response)
    }

    /// Revokes what a replayed code's first redemption issued, including
    /// every refresh token rotated from it and the access tokens those
    /// refreshes minted. Failures are logged; the replay itself is refused
    /// either way.
    async fn revoke_replayed(&self, code_hash: &str, client_id: &str, issued: Option<IssuedTokens>) {
        tracing::warn!(client_id = %client_id, "Authorization code replayed");

        let Some(issued) = issued else {
            return;
        };

        let mut access_tokens = vec![MintedAccessToken {
            jti: issued.access_token_jti,
            expires_at: issued.access_token_expires_at,
        }];

        if issued.refresh_token_expires_at.is_some() {
            match self.refresh_tokens.revoke_lineage(code_hash).await {
                Ok(family) => {
                    tracing::info!(
                        client_id = %client_id,
                        refresh_tokens = family.len(),
                        "Revoked refresh tokens of replayed code"
                    );
                    access_tokens.extend(family.into_iter().flat_map(|t| t.access_tokens));
                }
                Err(e) => {
                    tracing::warn!(client_id = %client_id, error = %e, "Failed to revoke refresh tokens of replayed code");
                }
            }
        }

        for minted in access_tokens {
            if let Err(e) = self.revoked.revoke(&minted.jti, minted.expires_at).await {
                tracing::warn!(client_id = %client_id, error = %e, "Failed to revoke access token of replayed code");
            }
        }
    }

    fn access_token_lifetime(&self, client: &Client) -> Duration {
        client
            .access_token_lifetime
            .map(Duration::seconds)
            .unwrap_or(self.issuer.lifetimes().access_token)
    }

    // ---- authorization endpoint ----

    /// Validates an authorization request.
    ///
    /// An unknown client or an unregistered redirect URI yields
    /// [`AuthorizeRejection::Page`]; every other problem is redirected.
    ///
    /// # Errors
    ///
    /// Returns the rejection describing how to report the failure.
    pub async fn validate_authorization_request(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<ValidatedAuthorizationRequest, AuthorizeRejection> {
        if request.client_id.is_empty() {
            return Err(AuthorizeRejection::Page(AuthError::invalid_request(
                "missing client_id",
            )));
        }

        let client = match self.registry.lookup_client(&request.client_id).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                return Err(AuthorizeRejection::Page(AuthError::invalid_client(
                    "unknown client",
                )));
            }
            Err(e) => return Err(AuthorizeRejection::Page(e)),
        };

        if request.redirect_uri.is_empty() || !client.is_redirect_uri_allowed(&request.redirect_uri) {
            tracing::warn!(
                client_id = %client.client_id,
                redirect_uri = %request.redirect_uri,
                "Redirect URI is not registered"
            );
            return Err(AuthorizeRejection::Page(AuthError::invalid_redirect_uri(
                &request.redirect_uri,
            )));
        }

        let redirect_uri = request.redirect_uri.as_str();
        let state = request.state.clone();

        let response_type = ResponseType::parse(&request.response_type).map_err(|e| {
            AuthorizeRejection::redirect(redirect_uri, ResponseMode::Query, &e, state.clone())
        })?;

        let mode = response_type.default_response_mode();
        let reject = |e: AuthError| AuthorizeRejection::redirect(redirect_uri, mode, &e, state.clone());

        let response_mode = response_type
            .response_mode(request.response_mode.as_deref())
            .map_err(&reject)?;

        let allowed = match response_type.grant_type() {
            GrantType::AuthorizationCode => client.is_grant_type_allowed(GrantType::AuthorizationCode),
            other => client.grant_types.contains(&other),
        };
        if !allowed {
            return Err(reject(AuthError::unauthorized_client(format!(
                "client '{}' may not use response_type '{}'",
                client.client_id, response_type
            ))));
        }

        let resources = self.registry.resources();
        let scopes = narrow_scopes(
            &ScopeSet::parse(&request.scope),
            &client,
            &resources,
            ScopeAudience::User,
        )
        .map_err(&reject)?;

        if response_type.includes_id_token() && !scopes.has_openid() {
            return Err(reject(AuthError::invalid_scope(
                "an identity token requires the openid scope",
            )));
        }

        let nonce = request.nonce.clone().filter(|n| !n.is_empty());
        if response_type.requires_nonce() && nonce.is_none() {
            return Err(reject(AuthError::invalid_request(
                "nonce is required when an identity token is returned",
            )));
        }

        let code_challenge = if response_type.includes_code() {
            match request.code_challenge.as_deref().filter(|c| !c.is_empty()) {
                Some(challenge) => {
                    PkceChallengeMethod::parse(request.code_challenge_method.as_deref())
                        .map_err(|e| reject(e.into()))?;
                    Some(PkceChallenge::new(challenge.to_string()).map_err(|e| reject(e.into()))?)
                }
                None if client.requires_pkce() => {
                    return Err(reject(AuthError::invalid_request(
                        "code_challenge is required for this client",
                    )));
                }
                None => None,
            }
        } else {
            None
        };

        Ok(ValidatedAuthorizationRequest {
            client,
            redirect_uri: request.redirect_uri.clone(),
            response_type,
            response_mode,
            scopes,
            state,
            nonce,
            code_challenge,
        })
    }

    /// Issues the response for a validated request once `user` has
    /// authenticated at `auth_time`.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if a token cannot be signed, or a storage
    /// error if the code cannot be stored.
    pub async fn authorize(
        &self,
        validated: &ValidatedAuthorizationRequest,
        user: &User,
        auth_time: i64,
    ) -> AuthResult<AuthorizationResponse> {
        let client_id = validated.client.client_id.as_str();
        let response_type = validated.response_type;
        let mut response = AuthorizationResponse {
            state: validated.state.clone(),
            ..Default::default()
        };

        if response_type.includes_code() {
            let (code, record) = AuthorizationCode::mint(
                client_id,
                &user.subject_id,
                validated.scopes.clone(),
                &validated.redirect_uri,
                validated.nonce.clone(),
                validated.code_challenge.clone(),
                auth_time,
                self.issuer.lifetimes().authorization_code,
            );
            self.codes.insert(record).await?;
            response.code = Some(code);
        }

        let resources = self.registry.resources();
        if response_type.includes_access_token() {
            let access = self.issuer.issue_access_token(
                client_id,
                &TokenSubject::password_user(&user.subject_id, auth_time),
                self.issuer.audience_for(&resources, &validated.scopes),
                &validated.scopes,
                self.access_token_lifetime(&validated.client),
            )?;
            response.access_token = Some(access.token);
            response.token_type = Some("Bearer".to_string());
            response.expires_in = Some(access.expires_in);
            response.scope = Some(validated.scopes.to_string());
        }

        if response_type.includes_id_token() {
            // Claims go in the identity token only when no access token
            // comes with it.
            let claims = if response_type.includes_access_token() {
                Map::new()
            } else {
                user.claims_json(&resources.claims_for(validated.scopes.iter()))
            };
            let id_token = self.issuer.issue_identity_token(IdentityTokenRequest {
                subject_id: &user.subject_id,
                client_id,
                auth_time,
                nonce: validated.nonce.as_deref(),
                claims,
                access_token: response.access_token.as_deref(),
                code: response.code.as_deref(),
            })?;
            response.id_token = Some(id_token);
        }

        tracing::info!(
            client_id = %client_id,
            subject = %user.subject_id,
            response_type = %response_type,
            "Authorization granted"
        );
        Ok(response)
    }

    /// Checks a username and password. Hash verification runs on the
    /// blocking pool.
    ///
    /// Returns `None` for an unknown user or a wrong password.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry fails or the blocking task panics.
    pub async fn verify_user_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> AuthResult<Option<User>> {
        let Some(user) = self.registry.lookup_user(username).await? else {
            tracing::debug!(username = %username, "Unknown user");
            return Ok(None);
        };

        let password = password.to_string();
        let (user, valid) = tokio::task::spawn_blocking(move || {
            let valid = user.verify_password(&password);
            (user, valid)
        })
        .await
        .map_err(|e| AuthError::internal(format!("password verification task failed: {e}")))?;

        if valid {
            Ok(Some(user))
        } else {
            tracing::debug!(subject = %user.subject_id, "Wrong password");
            Ok(None)
        }
    }

    // ---- bearer tokens ----

    /// Validates a bearer access token issued by this server, including the
    /// revocation list.
    ///
    /// # Errors
    ///
    /// Returns `ExpiredToken`, `SignatureInvalid` or `InvalidToken`.
    pub async fn validate_bearer(
        &self,
        token: &str,
        audience: Option<&str>,
    ) -> AuthResult<AccessTokenClaims> {
        let claims = self.issuer.validate_access_token(token, audience)?;
        if self.revoked.is_revoked(&claims.jti).await? {
            return Err(AuthError::invalid_token("token has been revoked"));
        }
        Ok(claims)
    }

    /// Revokes a refresh token or an access token presented by `client`.
    ///
    /// Unknown tokens, and tokens belonging to other clients, are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if a store fails.
    pub async fn revoke_token(
        &self,
        client: &Client,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> AuthResult<()> {
        let try_access_first = token_type_hint == Some("access_token");

        if try_access_first && self.revoke_access_token(client, token).await? {
            return Ok(());
        }
        if self.revoke_refresh_token(client, token).await? {
            return Ok(());
        }
        if !try_access_first {
            self.revoke_access_token(client, token).await?;
        }
        Ok(())
    }

    /// Reports whether `token` is active, for the client it was issued to.
    ///
    /// Revoked, expired, unknown and foreign tokens all come back inactive.
    ///
    /// # Errors
    ///
    /// Returns an error only if a store fails.
    pub async fn introspect(
        &self,
        client: &Client,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> AuthResult<IntrospectionResponse> {
        let try_refresh_first = token_type_hint == Some("refresh_token");

        if !try_refresh_first {
            if let Some(claims) = self.active_access_token(token).await? {
                if owned_by(client, &claims.client_id) {
                    return Ok(IntrospectionResponse::from_access_token(claims));
                }
                return Ok(IntrospectionResponse::inactive());
            }
        }

        let hash = RefreshToken::hash_token(token);
        if let Some(record) = self.refresh_tokens.find_by_hash(&hash).await? {
            let active = record.is_valid() && owned_by(client, &record.client_id);
            return Ok(if active {
                IntrospectionResponse::from_refresh_token(record, self.issuer.issuer())
            } else {
                IntrospectionResponse::inactive()
            });
        }

        if try_refresh_first {
            if let Some(claims) = self.active_access_token(token).await? {
                if owned_by(client, &claims.client_id) {
                    return Ok(IntrospectionResponse::from_access_token(claims));
                }
            }
        }
        Ok(IntrospectionResponse::inactive())
    }

    async fn active_access_token(&self, token: &str) -> AuthResult<Option<AccessTokenClaims>> {
        match self.validate_bearer(token, None).await {
            Ok(claims) => Ok(Some(claims)),
            Err(e) if e.is_server_error() => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn revoke_refresh_token(&self, client: &Client, token: &str) -> AuthResult<bool> {
        let hash = RefreshToken::hash_token(token);
        let Some(record) = self.refresh_tokens.find_by_hash(&hash).await? else {
            return Ok(false);
        };
        if record.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "Refusing to revoke another client's refresh token");
            return Ok(true);
        }
        self.refresh_tokens.revoke(&hash).await?;
        tracing::info!(client_id = %client.client_id, "Refresh token revoked");
        Ok(true)
    }

    async fn revoke_access_token(&self, client: &Client, token: &str) -> AuthResult<bool> {
        let Ok(claims) = self.issuer.validate_access_token(token, None) else {
            return Ok(false);
        };
        if claims.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "Refusing to revoke another client's access token");
            return Ok(true);
        }
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|e| AuthError::internal(format!("bad exp claim: {e}")))?;
        self.revoked.revoke(&claims.jti, expires_at).await?;
        tracing::info!(client_id = %client.client_id, "Access token revoked");
        Ok(true)
    }
}

fn owned_by(client: &Client, token_client_id: &str) -> bool {
    let owned = client.client_id == token_client_id;
    if !owned {
        tracing::debug!(client_id = %client.client_id, "Token belongs to another client");
    }
    owned
}

fn requested_scopes(request: &TokenRequest) -> ScopeSet {
    request.scope.as_deref().map(ScopeSet::parse).unwrap_or_default()
}

fn required<'a>(value: Option<&'a str>, name: &str) -> AuthResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_request(format!("missing {name}")))
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::storage::{MemoryCodeStore, MemoryRefreshTokenStore, MemoryRevokedTokenStore};
    use crate::token::{KeyStore, SigningKeyPair, TokenLifetimes};

    const MVC2_REDIRECT: &str = "https://localhost:5002/signin-oidc";
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    struct Fixture {
        engine: GrantEngine,
        registry: Arc<InMemoryRegistry>,
        codes: Arc<MemoryCodeStore>,
        refresh_tokens: Arc<MemoryRefreshTokenStore>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(InMemoryRegistry::sample().unwrap());
        let codes = Arc::new(MemoryCodeStore::new());
        let refresh_tokens = Arc::new(MemoryRefreshTokenStore::new());
        let keys = Arc::new(KeyStore::with_key(
            "https://localhost:5000",
            SigningKeyPair::generate_ec().unwrap(),
            Duration::hours(1),
        ));
        let issuer = Arc::new(TokenIssuer::new(
            keys,
            refresh_tokens.clone(),
            TokenLifetimes::default(),
        ));
        let engine = GrantEngine::new(
            registry.clone(),
            issuer,
            codes.clone(),
            refresh_tokens.clone(),
            Arc::new(MemoryRevokedTokenStore::new()),
        );
        Fixture {
            engine,
            registry,
            codes,
            refresh_tokens,
        }
    }

    async fn client(registry: &InMemoryRegistry, id: &str) -> Client {
        registry.lookup_client(id).await.unwrap().unwrap()
    }

    async fn alice(registry: &InMemoryRegistry) -> User {
        registry.lookup_user("alice").await.unwrap().unwrap()
    }

    fn hybrid_request() -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: "mvc2".into(),
            redirect_uri: MVC2_REDIRECT.into(),
            response_type: "code id_token".into(),
            scope: "openid profile api1 offline_access".into(),
            state: Some("xyz".into()),
            nonce: Some("n-0S6_WzA2Mj".into()),
            code_challenge: Some(CHALLENGE.into()),
            code_challenge_method: Some("S256".into()),
            response_mode: None,
        }
    }

    fn code_request(code: &str, verifier: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: "authorization_code".into(),
            code: Some(code.into()),
            redirect_uri: Some(MVC2_REDIRECT.into()),
            code_verifier: verifier.map(String::from),
            ..Default::default()
        }
    }

    async fn issue_code(f: &Fixture) -> String {
        let validated = f
            .engine
            .validate_authorization_request(&hybrid_request())
            .await
            .unwrap();
        let user = alice(&f.registry).await;
        f.engine
            .authorize(&validated, &user, now())
            .await
            .unwrap()
            .code
            .unwrap()
    }

    #[tokio::test]
    async fn test_client_credentials_has_no_subject() {
        let f = fixture();
        let client = client(&f.registry, "client").await;
        let response = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "client_credentials".into(),
                    scope: Some("api1".into()),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap();

        assert_eq!(response.scope, "api1");
        assert!(response.refresh_token.is_none());
        let claims = f
            .engine
            .validate_bearer(&response.access_token, Some("api1"))
            .await
            .unwrap();
        assert_eq!(claims.sub, None);
    }

    #[tokio::test]
    async fn test_client_credentials_scope_errors() {
        let f = fixture();
        let client = client(&f.registry, "client").await;
        let err = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "client_credentials".into(),
                    scope: Some("api2 openid".into()),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_scope");
    }

    #[tokio::test]
    async fn test_grant_type_checks() {
        let f = fixture();
        let client = client(&f.registry, "client").await;

        let err = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "password".into(),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");

        let err = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "urn:ietf:params:oauth:grant-type:device_code".into(),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_password_grant() {
        let f = fixture();
        let client = client(&f.registry, "ro.client").await;
        let request = TokenRequest {
            grant_type: "password".into(),
            username: Some("alice".into()),
            password: Some("password".into()),
            scope: Some("api1".into()),
            ..Default::default()
        };
        let response = f.engine.exchange(&request, &client).await.unwrap();
        let claims = f
            .engine
            .validate_bearer(&response.access_token, Some("api1"))
            .await
            .unwrap();
        assert_eq!(claims.sub.as_deref(), Some("1"));
        assert_eq!(claims.scope, "api1");

        let wrong = TokenRequest {
            password: Some("wrong".into()),
            ..request
        };
        let err = f.engine.exchange(&wrong, &client).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_code_redeemed_once_then_replay_revokes() {
        let f = fixture();
        let client = client(&f.registry, "mvc2").await;
        let code = issue_code(&f).await;

        let response = f
            .engine
            .exchange(&code_request(&code, Some(VERIFIER)), &client)
            .await
            .unwrap();
        assert!(response.id_token.is_some());
        let refresh_token = response.refresh_token.clone().unwrap();
        f.engine
            .validate_bearer(&response.access_token, Some("api1"))
            .await
            .unwrap();

        let err = f
            .engine
            .exchange(&code_request(&code, Some(VERIFIER)), &client)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        assert!(matches!(
            f.engine.validate_bearer(&response.access_token, Some("api1")).await,
            Err(AuthError::InvalidToken { .. })
        ));
        let err = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "refresh_token".into(),
                    refresh_token: Some(refresh_token),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    fn refresh_request(token: &str) -> TokenRequest {
        TokenRequest {
            grant_type: "refresh_token".into(),
            refresh_token: Some(token.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_replay_after_rotation_revokes_whole_lineage() {
        let f = fixture();
        let client = client(&f.registry, "mvc2").await;
        let code = issue_code(&f).await;

        let first = f
            .engine
            .exchange(&code_request(&code, Some(VERIFIER)), &client)
            .await
            .unwrap();
        let refreshed = f
            .engine
            .exchange(&refresh_request(&first.refresh_token.unwrap()), &client)
            .await
            .unwrap();
        let second = f
            .engine
            .exchange(&refresh_request(&refreshed.refresh_token.unwrap()), &client)
            .await
            .unwrap();
        f.engine
            .validate_bearer(&second.access_token, Some("api1"))
            .await
            .unwrap();

        let err = f
            .engine
            .exchange(&code_request(&code, Some(VERIFIER)), &client)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        for access_token in [&first.access_token, &refreshed.access_token, &second.access_token] {
            assert!(matches!(
                f.engine.validate_bearer(access_token, Some("api1")).await,
                Err(AuthError::InvalidToken { .. })
            ));
        }
        let err = f
            .engine
            .exchange(&refresh_request(&second.refresh_token.unwrap()), &client)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_replay_without_rotation_revokes_refreshed_access_tokens() {
        let mut f = fixture();
        f.engine = f.engine.with_refresh_token_rotation(false);
        let client = client(&f.registry, "mvc2").await;
        let code = issue_code(&f).await;

        let first = f
            .engine
            .exchange(&code_request(&code, Some(VERIFIER)), &client)
            .await
            .unwrap();
        let refresh_token = first.refresh_token.unwrap();
        let refreshed = f
            .engine
            .exchange(&refresh_request(&refresh_token), &client)
            .await
            .unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some(refresh_token.as_str()));

        f.engine
            .exchange(&code_request(&code, Some(VERIFIER)), &client)
            .await
            .unwrap_err();

        assert!(
            f.engine
                .validate_bearer(&refreshed.access_token, Some("api1"))
                .await
                .is_err()
        );
        let err = f
            .engine
            .exchange(&refresh_request(&refresh_token), &client)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_code_pkce_and_redirect_checks() {
        let f = fixture();
        let client = client(&f.registry, "mvc2").await;

        let code = issue_code(&f).await;
        let err = f
            .engine
            .exchange(
                &code_request(&code, Some("x".repeat(43).as_str())),
                &client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let code = issue_code(&f).await;
        let err = f
            .engine
            .exchange(&code_request(&code, None), &client)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let code = issue_code(&f).await;
        let mut request = code_request(&code, Some(VERIFIER));
        request.redirect_uri = Some("https://localhost:5002/other".into());
        let err = f.engine.exchange(&request, &client).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_concurrent_redemption_has_one_winner() {
        let f = Arc::new(fixture());
        let client = client(&f.registry, "mvc2").await;
        let code = issue_code(&f).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let f = Arc::clone(&f);
            let client = client.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                f.engine
                    .exchange(&code_request(&code, Some(VERIFIER)), &client)
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(f.codes.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_narrows() {
        let f = fixture();
        let client = client(&f.registry, "mvc2").await;
        let code = issue_code(&f).await;
        let first = f
            .engine
            .exchange(&code_request(&code, Some(VERIFIER)), &client)
            .await
            .unwrap()
            .refresh_token
            .unwrap();

        let refreshed = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "refresh_token".into(),
                    refresh_token: Some(first.clone()),
                    scope: Some("api1 api2".into()),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap();
        assert_eq!(refreshed.scope, "api1");
        let second = refreshed.refresh_token.unwrap();
        assert_ne!(second, first);

        let err = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "refresh_token".into(),
                    refresh_token: Some(first),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
        assert_eq!(f.refresh_tokens.len(), 2);
    }

    #[tokio::test]
    async fn test_authorize_page_and_redirect_rejections() {
        let f = fixture();

        let unknown = AuthorizationRequest {
            client_id: "ghost".into(),
            ..hybrid_request()
        };
        assert!(matches!(
            f.engine.validate_authorization_request(&unknown).await,
            Err(AuthorizeRejection::Page(AuthError::InvalidClient { .. }))
        ));

        let bad_redirect = AuthorizationRequest {
            redirect_uri: "https://evil.example/cb".into(),
            ..hybrid_request()
        };
        assert!(matches!(
            f.engine.validate_authorization_request(&bad_redirect).await,
            Err(AuthorizeRejection::Page(AuthError::InvalidRedirectUri { .. }))
        ));

        let no_nonce = AuthorizationRequest {
            nonce: None,
            ..hybrid_request()
        };
        match f.engine.validate_authorization_request(&no_nonce).await {
            Err(AuthorizeRejection::Redirect { error, mode, .. }) => {
                assert_eq!(error.error.as_str(), "invalid_request");
                assert_eq!(error.state.as_deref(), Some("xyz"));
                assert_eq!(mode, ResponseMode::Fragment);
            }
            other => panic!("unexpected {other:?}"),
        }

        let no_pkce = AuthorizationRequest {
            code_challenge: None,
            ..hybrid_request()
        };
        assert!(matches!(
            f.engine.validate_authorization_request(&no_pkce).await,
            Err(AuthorizeRejection::Redirect { .. })
        ));
    }

    #[tokio::test]
    async fn test_implicit_response_carries_claims() {
        let f = fixture();
        let request = AuthorizationRequest {
            client_id: "mvc".into(),
            redirect_uri: "https://localhost:5021/signin-oidc".into(),
            response_type: "id_token".into(),
            scope: "openid profile".into(),
            nonce: Some("abc".into()),
            ..Default::default()
        };
        let validated = f.engine.validate_authorization_request(&request).await.unwrap();
        let user = alice(&f.registry).await;
        let response = f.engine.authorize(&validated, &user, now()).await.unwrap();

        assert!(response.code.is_none());
        assert!(response.access_token.is_none());
        let id_token = f
            .engine
            .issuer()
            .validate_identity_token_hint(&response.id_token.unwrap())
            .unwrap();
        assert_eq!(id_token.sub, "1");
        assert_eq!(id_token.aud, "mvc");
        assert_eq!(id_token.nonce.as_deref(), Some("abc"));
        assert_eq!(id_token.claims["name"], "Alice");
    }

    #[tokio::test]
    async fn test_revocation() {
        let f = fixture();
        let client = client(&f.registry, "client").await;
        let other = client_for_other(&f).await;
        let response = f
            .engine
            .exchange(
                &TokenRequest {
                    grant_type: "client_credentials".into(),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap();

        f.engine
            .revoke_token(&other, &response.access_token, None)
            .await
            .unwrap();
        assert!(f.engine.validate_bearer(&response.access_token, None).await.is_ok());

        f.engine
            .revoke_token(&client, &response.access_token, Some("access_token"))
            .await
            .unwrap();
        assert!(f.engine.validate_bearer(&response.access_token, None).await.is_err());

        f.engine.revoke_token(&client, "garbage", None).await.unwrap();
    }

    async fn client_for_other(f: &Fixture) -> Client {
        client(&f.registry, "ro.client").await
    }
}
