//! OpenID Connect discovery.
//!
//! The discovery document and the JWKS are derived from the registry and the
//! key store. Both are cached and rebuilt only when one of the two reports a
//! new generation, so serving them costs one atomic load on the hot path.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::oauth::authorize::ResponseType;
use crate::oauth::client_auth::TokenEndpointAuthMethod;
use crate::oauth::pkce::PkceChallengeMethod;
use crate::registry::Registry;
use crate::token::{Jwks, KeyStore};
use crate::types::GrantType;

/// Path of the discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
/// Path of the JWKS.
pub const JWKS_PATH: &str = "/.well-known/openid-configuration/jwks";
pub const AUTHORIZE_PATH: &str = "/connect/authorize";
pub const TOKEN_PATH: &str = "/connect/token";
pub const USERINFO_PATH: &str = "/connect/userinfo";
pub const REVOCATION_PATH: &str = "/connect/revocation";
pub const INTROSPECTION_PATH: &str = "/connect/introspect";
pub const END_SESSION_PATH: &str = "/connect/endsession";

/// OpenID Provider metadata.
///
/// ```json
/// {
///   "issuer": "http://localhost:5000",
///   "authorization_endpoint": "http://localhost:5000/connect/authorize",
///   "token_endpoint": "http://localhost:5000/connect/token",
///   "jwks_uri": "http://localhost:5000/.well-known/openid-configuration/jwks",
///   "scopes_supported": ["api1", "offline_access", "openid", "profile"],
///   "grant_types_supported": ["authorization_code", "client_credentials", ...],
///   "response_types_supported": ["code", "id_token", ...]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub end_session_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

impl DiscoveryDocument {
    /// Builds the document for `issuer` from the registry's resources and the
    /// algorithms of the published keys.
    #[must_use]
    pub fn build(issuer: &str, registry: &dyn Registry, jwks: &Jwks) -> Self {
        let base = issuer.trim_end_matches('/');
        let resources = registry.resources();

        let mut claims_supported = vec!["sub".to_string()];
        claims_supported.extend(resources.all_claim_names());

        let mut algorithms: Vec<String> = jwks.keys.iter().map(|k| k.alg.clone()).collect();
        algorithms.sort();
        algorithms.dedup();

        let grant_types = [
            GrantType::AuthorizationCode,
            GrantType::ClientCredentials,
            GrantType::RefreshToken,
            GrantType::Implicit,
            GrantType::Password,
        ];

        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{base}{AUTHORIZE_PATH}"),
            token_endpoint: format!("{base}{TOKEN_PATH}"),
            userinfo_endpoint: format!("{base}{USERINFO_PATH}"),
            revocation_endpoint: format!("{base}{REVOCATION_PATH}"),
            introspection_endpoint: format!("{base}{INTROSPECTION_PATH}"),
            end_session_endpoint: format!("{base}{END_SESSION_PATH}"),
            jwks_uri: format!("{base}{JWKS_PATH}"),
            scopes_supported: resources.all_scope_names(),
            claims_supported,
            grant_types_supported: grant_types.iter().map(|g| g.as_str().to_string()).collect(),
            response_types_supported: ResponseType::all()
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            response_modes_supported: vec!["query".to_string(), "fragment".to_string()],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: algorithms,
            code_challenge_methods_supported: vec![PkceChallengeMethod::S256.as_str().to_string()],
            token_endpoint_auth_methods_supported: TokenEndpointAuthMethod::supported()
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    generations: (u64, u64),
    document: Arc<DiscoveryDocument>,
    jwks: Arc<Jwks>,
}

/// Caches the discovery document and JWKS.
pub struct DiscoveryCache {
    registry: Arc<dyn Registry>,
    keys: Arc<KeyStore>,
    snapshot: ArcSwap<Snapshot>,
}

impl DiscoveryCache {
    /// Creates a cache and builds the first snapshot.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>, keys: Arc<KeyStore>) -> Self {
        let snapshot = build_snapshot(registry.as_ref(), &keys);
        Self {
            registry,
            keys,
            snapshot: ArcSwap::from_pointee(snapshot),
        }
    }

    /// The current discovery document.
    #[must_use]
    pub fn document(&self) -> Arc<DiscoveryDocument> {
        Arc::clone(&self.current().document)
    }

    /// The current public key set.
    #[must_use]
    pub fn jwks(&self) -> Arc<Jwks> {
        Arc::clone(&self.current().jwks)
    }

    fn current(&self) -> Arc<Snapshot> {
        let generations = (self.keys.generation(), self.registry.generation());
        let snapshot = self.snapshot.load_full();
        if snapshot.generations == generations {
            return snapshot;
        }

        let fresh = Arc::new(build_snapshot(self.registry.as_ref(), &self.keys));
        tracing::debug!(
            key_generation = fresh.generations.0,
            registry_generation = fresh.generations.1,
            "Rebuilt discovery cache"
        );
        self.snapshot.store(Arc::clone(&fresh));
        fresh
    }
}

fn build_snapshot(registry: &dyn Registry, keys: &KeyStore) -> Snapshot {
    // Read the generations first so a concurrent change forces another
    // rebuild instead of being masked.
    let generations = (keys.generation(), registry.generation());
    let jwks = keys.public_key_set();
    let document = DiscoveryDocument::build(keys.issuer(), registry, &jwks);
    Snapshot {
        generations,
        document: Arc::new(document),
        jwks: Arc::new(jwks),
    }
}
