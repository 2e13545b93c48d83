//! Registry seed data as it appears in configuration.
//!
//! Seeds carry plaintext client secrets and user passwords. They are hashed
//! when the registry is built and never kept in plaintext afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::{hash_client_secret, hash_password};
use crate::registry::RegistryError;
use crate::types::{ApiResource, Client, GrantType, IdentityResource, User};

/// Everything the registry is loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySeed {
    #[serde(default)]
    pub api_resources: Vec<ApiResource>,
    #[serde(default)]
    pub identity_resources: Vec<IdentityResource>,
    #[serde(default)]
    pub clients: Vec<ClientSeed>,
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

impl Default for RegistrySeed {
    fn default() -> Self {
        Self::sample()
    }
}

/// A client registration with plaintext secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSeed {
    pub client_id: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub secrets: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub allowed_scopes: BTreeSet<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub allow_offline_access: bool,
    #[serde(default)]
    pub require_pkce: bool,
    #[serde(default = "default_true")]
    pub require_client_secret: bool,
    #[serde(default, with = "humantime_serde")]
    pub access_token_lifetime: Option<Duration>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A test user with a plaintext password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSeed {
    pub subject_id: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub claims: BTreeMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl ClientSeed {
    /// Converts the seed into a registered client, hashing its secrets.
    #[must_use]
    pub fn into_client(self) -> Client {
        Client {
            client_id: self.client_id,
            client_name: self.client_name,
            secret_hashes: self.secrets.iter().map(|s| hash_client_secret(s)).collect(),
            grant_types: self.grant_types,
            allowed_scopes: self.allowed_scopes,
            redirect_uris: self.redirect_uris,
            post_logout_redirect_uris: self.post_logout_redirect_uris,
            allow_offline_access: self.allow_offline_access,
            require_pkce: self.require_pkce,
            require_client_secret: self.require_client_secret,
            access_token_lifetime: self
                .access_token_lifetime
                .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX)),
            enabled: self.enabled,
        }
    }
}

impl UserSeed {
    /// Converts the seed into a user, hashing the password with Argon2id.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::PasswordHash` if hashing fails.
    pub fn into_user(self) -> Result<User, RegistryError> {
        let password_hash =
            hash_password(&self.password).map_err(|e| RegistryError::PasswordHash {
                username: self.username.clone(),
                message: e.to_string(),
            })?;

        Ok(User {
            subject_id: self.subject_id,
            username: self.username,
            password_hash,
            claims: self.claims,
        })
    }
}

impl RegistrySeed {
    /// The demonstration fixtures: API `api1`, identity scopes `openid` and
    /// `profile`, four clients and the users `alice` and `bob`.
    #[must_use]
    pub fn sample() -> Self {
        let scopes = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();

        Self {
            api_resources: vec![ApiResource::new("api1", "My API")],
            identity_resources: vec![IdentityResource::openid(), IdentityResource::profile()],
            clients: vec![
                ClientSeed {
                    client_id: "client".into(),
                    client_name: String::new(),
                    secrets: vec!["secret".into()],
                    grant_types: vec![GrantType::ClientCredentials],
                    allowed_scopes: scopes(&["api1"]),
                    redirect_uris: vec![],
                    post_logout_redirect_uris: vec![],
                    allow_offline_access: false,
                    require_pkce: false,
                    require_client_secret: true,
                    access_token_lifetime: None,
                    enabled: true,
                },
                ClientSeed {
                    client_id: "ro.client".into(),
                    client_name: String::new(),
                    secrets: vec!["secret".into()],
                    grant_types: vec![GrantType::Password],
                    allowed_scopes: scopes(&["api1"]),
                    redirect_uris: vec![],
                    post_logout_redirect_uris: vec![],
                    allow_offline_access: false,
                    require_pkce: false,
                    require_client_secret: true,
                    access_token_lifetime: None,
                    enabled: true,
                },
                ClientSeed {
                    client_id: "mvc".into(),
                    client_name: "MVC Client".into(),
                    secrets: vec![],
                    grant_types: vec![GrantType::Implicit],
                    allowed_scopes: scopes(&["openid", "profile"]),
                    redirect_uris: vec!["https://localhost:5021/signin-oidc".into()],
                    post_logout_redirect_uris: vec![
                        "https://localhost:5021/signout-callback-oidc".into(),
                    ],
                    allow_offline_access: false,
                    require_pkce: false,
                    require_client_secret: false,
                    access_token_lifetime: None,
                    enabled: true,
                },
                ClientSeed {
                    client_id: "mvc2".into(),
                    client_name: "MVC Hybrid Client".into(),
                    secrets: vec!["secret".into()],
                    grant_types: vec![GrantType::Hybrid, GrantType::ClientCredentials],
                    allowed_scopes: scopes(&["openid", "profile", "api1"]),
                    redirect_uris: vec!["https://localhost:5002/signin-oidc".into()],
                    post_logout_redirect_uris: vec![
                        "https://localhost:5002/signout-callback-oidc".into(),
                    ],
                    allow_offline_access: true,
                    require_pkce: true,
                    require_client_secret: true,
                    access_token_lifetime: None,
                    enabled: true,
                },
            ],
            users: vec![
                UserSeed {
                    subject_id: "1".into(),
                    username: "alice".into(),
                    password: "password".into(),
                    claims: BTreeMap::from([
                        ("name".to_string(), vec!["Alice".to_string()]),
                        ("website".to_string(), vec!["https://alice.com".to_string()]),
                    ]),
                },
                UserSeed {
                    subject_id: "2".into(),
                    username: "bob".into(),
                    password: "password".into(),
                    claims: BTreeMap::from([
                        ("name".to_string(), vec!["Bob".to_string()]),
                        ("website".to_string(), vec!["https://bob.com".to_string()]),
                    ]),
                },
            ],
        }
    }
}
