//! API and identity resources.
//!
//! An API resource is an audience for access tokens and exposes one or more
//! scopes. An identity resource is a scope that releases user claims.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Scope that requests a refresh token.
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Scope that marks a request as OpenID Connect.
pub const OPENID: &str = "openid";

/// A protected API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResource {
    /// Resource name, used as the `aud` of access tokens.
    pub name: String,

    /// Display name.
    #[serde(default)]
    pub display_name: String,

    /// Scopes this API exposes. An empty list means the single scope `name`.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ApiResource {
    /// Creates an API resource exposing one scope named after it.
    #[must_use]
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            scopes: Vec::new(),
        }
    }

    /// Returns the scopes this resource exposes.
    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        let own = self.scopes.is_empty().then_some(self.name.as_str());
        own.into_iter().chain(self.scopes.iter().map(String::as_str))
    }
}

/// A scope that releases identity claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityResource {
    /// Scope name.
    pub name: String,

    /// Display name.
    #[serde(default)]
    pub display_name: String,

    /// Claim types released when this scope is granted.
    pub claims: Vec<String>,
}

impl IdentityResource {
    /// The `openid` scope, releasing `sub`.
    #[must_use]
    pub fn openid() -> Self {
        Self {
            name: OPENID.to_string(),
            display_name: "Your user identifier".to_string(),
            claims: vec!["sub".to_string()],
        }
    }

    /// The standard `profile` scope.
    #[must_use]
    pub fn profile() -> Self {
        Self {
            name: "profile".to_string(),
            display_name: "User profile".to_string(),
            claims: [
                "name",
                "family_name",
                "given_name",
                "middle_name",
                "nickname",
                "preferred_username",
                "profile",
                "picture",
                "website",
                "gender",
                "birthdate",
                "zoneinfo",
                "locale",
                "updated_at",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    /// The standard `email` scope.
    #[must_use]
    pub fn email() -> Self {
        Self {
            name: "email".to_string(),
            display_name: "Your email address".to_string(),
            claims: vec!["email".to_string(), "email_verified".to_string()],
        }
    }
}

/// Every resource the server knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    /// Protected APIs.
    pub api_resources: Vec<ApiResource>,
    /// Identity scopes.
    pub identity_resources: Vec<IdentityResource>,
}

impl Resources {
    /// Returns `true` if `scope` is defined by a resource or is `offline_access`.
    #[must_use]
    pub fn is_known_scope(&self, scope: &str) -> bool {
        scope == OFFLINE_ACCESS || self.is_api_scope(scope) || self.is_identity_scope(scope)
    }

    /// Returns `true` if `scope` belongs to an API resource.
    #[must_use]
    pub fn is_api_scope(&self, scope: &str) -> bool {
        self.api_resources
            .iter()
            .any(|api| api.scope_names().any(|s| s == scope))
    }

    /// Returns `true` if `scope` is an identity resource.
    #[must_use]
    pub fn is_identity_scope(&self, scope: &str) -> bool {
        self.identity_resources.iter().any(|r| r.name == scope)
    }

    /// Names of the API resources exposing any of `scopes`.
    #[must_use]
    pub fn audiences_for<'a>(&self, scopes: impl IntoIterator<Item = &'a str> + Clone) -> Vec<String> {
        self.api_resources
            .iter()
            .filter(|api| {
                scopes
                    .clone()
                    .into_iter()
                    .any(|s| api.scope_names().any(|own| own == s))
            })
            .map(|api| api.name.clone())
            .collect()
    }

    /// Claim types released by the identity scopes among `scopes`.
    #[must_use]
    pub fn claims_for<'a>(&self, scopes: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let mut claims = BTreeSet::new();
        for scope in scopes {
            if let Some(resource) = self.identity_resources.iter().find(|r| r.name == scope) {
                claims.extend(resource.claims.iter().cloned());
            }
        }
        claims
    }

    /// All scope names, sorted, including `offline_access`.
    #[must_use]
    pub fn all_scope_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .identity_resources
            .iter()
            .map(|r| r.name.clone())
            .collect();
        for api in &self.api_resources {
            names.extend(api.scope_names().map(String::from));
        }
        names.insert(OFFLINE_ACCESS.to_string());
        names.into_iter().collect()
    }

    /// All claim types released by identity resources, sorted.
    #[must_use]
    pub fn all_claim_names(&self) -> Vec<String> {
        self.claims_for(self.identity_resources.iter().map(|r| r.name.as_str()))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources() -> Resources {
        Resources {
            api_resources: vec![
                ApiResource::new("api1", "My API"),
                ApiResource {
                    name: "orders".to_string(),
                    display_name: "Orders".to_string(),
                    scopes: vec!["orders.read".to_string(), "orders.write".to_string()],
                },
            ],
            identity_resources: vec![IdentityResource::openid(), IdentityResource::profile()],
        }
    }

    #[test]
    fn test_api_resource_default_scope() {
        let api = ApiResource::new("api1", "My API");
        assert_eq!(api.scope_names().collect::<Vec<_>>(), vec!["api1"]);
    }

    #[test]
    fn test_known_scopes() {
        let r = resources();
        assert!(r.is_known_scope("api1"));
        assert!(r.is_known_scope("orders.read"));
        assert!(!r.is_known_scope("orders"));
        assert!(r.is_known_scope("openid"));
        assert!(r.is_known_scope("offline_access"));
        assert!(!r.is_known_scope("email"));
    }

    #[test]
    fn test_audiences_for_scopes() {
        let r = resources();
        assert_eq!(r.audiences_for(["api1", "openid"]), vec!["api1"]);
        assert_eq!(r.audiences_for(["orders.write"]), vec!["orders"]);
        assert!(r.audiences_for(["profile"]).is_empty());
    }

    #[test]
    fn test_claims_for_scopes() {
        let r = resources();
        let claims = r.claims_for(["openid", "profile", "api1"]);
        assert!(claims.contains("sub"));
        assert!(claims.contains("website"));
        assert!(!claims.contains("email"));
    }

    #[test]
    fn test_all_scope_names_sorted() {
        let names = resources().all_scope_names();
        assert_eq!(
            names,
            vec![
                "api1",
                "offline_access",
                "openid",
                "orders.read",
                "orders.write",
                "profile"
            ]
        );
    }
}
