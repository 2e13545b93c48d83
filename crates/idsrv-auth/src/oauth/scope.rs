//! Scope parsing and narrowing.
//!
//! Requests never escalate: the granted set is the intersection of what was
//! requested, what the client is allowed, and what the server defines. Scopes
//! outside that intersection are dropped silently. Only an empty result is
//! an error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::{Client, OFFLINE_ACCESS, OPENID, Resources};

/// An ordered, duplicate-free set of scope names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Parses a space-delimited `scope` parameter.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        value.split_whitespace().collect()
    }

    /// Returns `true` if `scope` is in the set.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the scope names.
    pub fn iter(&self) -> impl Iterator<Item = &str> + Clone {
        self.0.iter().map(String::as_str)
    }

    /// Returns `true` if `offline_access` is in the set.
    #[must_use]
    pub fn has_offline_access(&self) -> bool {
        self.contains(OFFLINE_ACCESS)
    }

    /// Returns `true` if `openid` is in the set.
    #[must_use]
    pub fn has_openid(&self) -> bool {
        self.contains(OPENID)
    }

    /// Returns `true` if every scope here is also in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.iter().all(|s| other.contains(s))
    }
}

impl<'a> FromIterator<&'a str> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut scopes: Vec<String> = Vec::new();
        for scope in iter {
            if !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }
        Self(scopes)
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// What kind of principal the granted scopes will be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeAudience {
    /// The client alone (client credentials). Only API scopes apply.
    Client,
    /// A resource owner. API, identity and `offline_access` scopes apply.
    User,
}

/// Narrows `requested` to what `client` may receive.
///
/// An empty request means "everything the client is allowed" for this kind
/// of grant, except `offline_access`, which must always be asked for.
///
/// # Errors
///
/// Returns `InvalidScope` when nothing survives narrowing.
pub fn narrow_scopes(
    requested: &ScopeSet,
    client: &Client,
    resources: &Resources,
    audience: ScopeAudience,
) -> AuthResult<ScopeSet> {
    let applies = |scope: &str| match audience {
        ScopeAudience::Client => resources.is_api_scope(scope),
        ScopeAudience::User => resources.is_known_scope(scope),
    };

    let granted: ScopeSet = if requested.is_empty() {
        client
            .allowed_scopes
            .iter()
            .map(String::as_str)
            .filter(|&s| applies(s))
            .collect()
    } else {
        requested
            .iter()
            .filter(|&s| client.is_scope_allowed(s) && applies(s))
            .collect()
    };

    if granted.is_empty() {
        return Err(AuthError::invalid_scope(format!(
            "none of the requested scopes are available to client '{}'",
            client.client_id
        )));
    }

    if granted.0.len() < requested.0.len() {
        let dropped: Vec<&str> = requested.iter().filter(|&s| !granted.contains(s)).collect();
        tracing::debug!(
            client_id = %client.client_id,
            dropped = ?dropped,
            "Narrowed requested scopes"
        );
    }

    Ok(granted)
}
