//! Assembles the authorization server from configuration.
//!
//! Loads or generates the signing key, builds the registry and the stores,
//! and starts the background tasks (expiry sweep, scheduled key rotation).

use std::sync::Arc;
use std::time::Duration;

use idsrv_auth::config::AuthConfig;
use idsrv_auth::credentials::sha256_hex;
use idsrv_auth::discovery::DiscoveryCache;
use idsrv_auth::oauth::GrantEngine;
use idsrv_auth::registry::{InMemoryRegistry, Registry, RegistryError, RegistrySeed};
use idsrv_auth::storage::{
    CodeStore, ExpirySweeper, MemoryCodeStore, MemoryRefreshTokenStore, MemoryRevokedTokenStore,
    RefreshTokenStore, RevokedTokenStore,
};
use idsrv_auth::token::{
    JwtError, KeyStore, SigningAlgorithm, SigningKeyPair, TokenIssuer, TokenLifetimes,
};
use idsrv_auth::IdentityServerState;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),
    #[error("failed to read signing key {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid registry: {0}")]
    Registry(#[from] RegistryError),
}

impl From<JwtError> for BootstrapError {
    fn from(e: JwtError) -> Self {
        Self::KeyUnavailable(e.to_string())
    }
}

/// Everything a running server holds on to.
pub struct Services {
    pub state: IdentityServerState,
    pub keys: Arc<KeyStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl Services {
    /// Stops the background tasks.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds the services for `auth` and `seed`. Must run inside a Tokio runtime.
pub async fn build_services(
    auth: &AuthConfig,
    seed: RegistrySeed,
) -> Result<Services, BootstrapError> {
    let retention = time::Duration::try_from(auth.oauth.longest_signed_token_lifetime())
        .unwrap_or(time::Duration::MAX);
    let key = load_signing_key(auth).await?;
    tracing::info!(kid = %key.kid, algorithm = %key.algorithm, "Signing key ready");
    let keys = Arc::new(KeyStore::with_key(auth.issuer_base(), key, retention));

    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::from_seed(seed)?);
    let codes: Arc<dyn CodeStore> = Arc::new(MemoryCodeStore::new());
    let refresh_tokens: Arc<dyn RefreshTokenStore> = Arc::new(MemoryRefreshTokenStore::new());
    let revoked: Arc<dyn RevokedTokenStore> = Arc::new(MemoryRevokedTokenStore::new());

    let issuer = Arc::new(TokenIssuer::new(
        Arc::clone(&keys),
        Arc::clone(&refresh_tokens),
        TokenLifetimes::from(&auth.oauth),
    ));
    let engine = Arc::new(
        GrantEngine::new(
            Arc::clone(&registry),
            issuer,
            Arc::clone(&codes),
            Arc::clone(&refresh_tokens),
            Arc::clone(&revoked),
        )
        .with_refresh_token_rotation(auth.oauth.refresh_token_rotation),
    );
    let discovery = Arc::new(DiscoveryCache::new(registry, Arc::clone(&keys)));

    let mut tasks = Vec::new();
    let sweeper = Arc::new(ExpirySweeper::new(
        codes,
        refresh_tokens,
        revoked,
        Arc::clone(&keys),
    ));
    tasks.push(sweeper.start(auth.sweep.interval));

    if let Some(interval) = auth.signing.rotation_interval {
        tasks.push(start_key_rotation(
            Arc::clone(&keys),
            auth.signing.algorithm,
            interval,
        ));
    }

    Ok(Services {
        state: IdentityServerState::new(engine, discovery),
        keys,
        tasks,
    })
}

/// Reads the configured PEM key, or generates one.
async fn load_signing_key(auth: &AuthConfig) -> Result<SigningKeyPair, BootstrapError> {
    let algorithm = auth.signing.algorithm;
    let Some(path) = &auth.signing.private_key_path else {
        return generate_key(algorithm).await;
    };

    let pem = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BootstrapError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
    // A stable kid for a file key, so restarts do not invalidate caches.
    let kid = auth
        .signing
        .key_id
        .clone()
        .unwrap_or_else(|| sha256_hex(pem.trim())[..16].to_string());

    tokio::task::spawn_blocking(move || SigningKeyPair::from_private_pem(kid, algorithm, &pem))
        .await
        .map_err(|e| BootstrapError::KeyUnavailable(e.to_string()))?
        .map_err(BootstrapError::from)
}

async fn generate_key(algorithm: SigningAlgorithm) -> Result<SigningKeyPair, BootstrapError> {
    tokio::task::spawn_blocking(move || SigningKeyPair::generate(algorithm))
        .await
        .map_err(|e| BootstrapError::KeyUnavailable(e.to_string()))?
        .map_err(BootstrapError::from)
}

/// Generates and activates a fresh key every `interval`.
///
/// The first tick is skipped, the key loaded at startup is already fresh.
/// A failed generation keeps the current key and is retried next tick.
fn start_key_rotation(
    keys: Arc<KeyStore>,
    algorithm: SigningAlgorithm,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match generate_key(algorithm).await {
                Ok(key) => {
                    tracing::info!(kid = %key.kid, "Rotating signing key");
                    keys.rotate(key);
                }
                Err(e) => tracing::error!(error = %e, "Signing key rotation failed"),
            }
        }
    })
}
