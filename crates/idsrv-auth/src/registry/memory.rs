use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::AuthResult;
use crate::registry::{Registry, RegistryError, RegistrySeed};
use crate::types::{Client, OFFLINE_ACCESS, Resources, User};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Registry held entirely in memory, built from a seed.
#[derive(Debug)]
pub struct InMemoryRegistry {
    clients: HashMap<String, Client>,
    users: HashMap<String, User>,
    subjects: HashMap<String, String>,
    resources: Arc<Resources>,
    generation: u64,
}

impl InMemoryRegistry {
    /// Validates `seed` and builds the registry.
    ///
    /// Secrets and passwords are hashed here. Password hashing is slow on
    /// purpose, so call this from a blocking context when the seed is large.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] found.
    pub fn from_seed(seed: RegistrySeed) -> Result<Self, RegistryError> {
        let resources = Resources {
            api_resources: seed.api_resources,
            identity_resources: seed.identity_resources,
        };
        check_scope_names(&resources)?;

        let mut clients = HashMap::with_capacity(seed.clients.len());
        for client_seed in seed.clients {
            let client = client_seed.into_client();
            client
                .validate()
                .map_err(|source| RegistryError::InvalidClient {
                    client_id: client.client_id.clone(),
                    source,
                })?;

            if let Some(scope) = client
                .allowed_scopes
                .iter()
                .find(|s| s.as_str() != OFFLINE_ACCESS && !resources.is_known_scope(s))
            {
                return Err(RegistryError::UnknownScope {
                    client_id: client.client_id.clone(),
                    scope: scope.clone(),
                });
            }

            if clients.contains_key(&client.client_id) {
                return Err(RegistryError::DuplicateClient {
                    client_id: client.client_id,
                });
            }
            clients.insert(client.client_id.clone(), client);
        }

        let mut users = HashMap::with_capacity(seed.users.len());
        let mut subjects = HashMap::with_capacity(seed.users.len());
        for user_seed in seed.users {
            if users.contains_key(&user_seed.username) {
                return Err(RegistryError::DuplicateUsername {
                    username: user_seed.username,
                });
            }
            if subjects.contains_key(&user_seed.subject_id) {
                return Err(RegistryError::DuplicateSubject {
                    subject_id: user_seed.subject_id,
                });
            }

            let user = user_seed.into_user()?;
            subjects.insert(user.subject_id.clone(), user.username.clone());
            users.insert(user.username.clone(), user);
        }

        tracing::info!(
            clients = clients.len(),
            users = users.len(),
            api_resources = resources.api_resources.len(),
            identity_resources = resources.identity_resources.len(),
            "Registry loaded"
        );

        Ok(Self {
            clients,
            users,
            subjects,
            resources: Arc::new(resources),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Registry holding the demonstration fixtures.
    ///
    /// # Errors
    ///
    /// Only fails if password hashing fails.
    pub fn sample() -> Result<Self, RegistryError> {
        Self::from_seed(RegistrySeed::sample())
    }

    /// Ids of all registered clients, sorted.
    #[must_use]
    pub fn client_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

fn check_scope_names(resources: &Resources) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    let names = resources
        .identity_resources
        .iter()
        .map(|r| r.name.as_str())
        .chain(resources.api_resources.iter().flat_map(|a| a.scope_names()));

    for name in names {
        if name == OFFLINE_ACCESS || !seen.insert(name) {
            return Err(RegistryError::DuplicateScope {
                scope: name.to_string(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn lookup_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).filter(|c| c.enabled).cloned())
    }

    async fn lookup_user(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(username).cloned())
    }

    async fn find_user_by_subject(&self, subject_id: &str) -> AuthResult<Option<User>> {
        Ok(self
            .subjects
            .get(subject_id)
            .and_then(|username| self.users.get(username))
            .cloned())
    }

    fn resources(&self) -> Arc<Resources> {
        Arc::clone(&self.resources)
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}
