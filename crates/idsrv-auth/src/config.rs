//! Authorization server configuration.
//!
//! Lifetimes and intervals are written as human-readable durations
//! (`"5m"`, `"1h"`, `"30d"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://localhost:5000"
//!
//! [auth.oauth]
//! access_token_lifetime = "1h"
//! refresh_token_lifetime = "30d"
//!
//! [auth.signing]
//! algorithm = "RS256"
//! rotation_interval = "30d"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::token::jwt::SigningAlgorithm;

/// Root configuration of the authorization server core.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL, used as `iss` and as the base of every endpoint URL.
    pub issuer: String,

    /// Grant and token lifetimes.
    pub oauth: OAuthConfig,

    /// Signing key source and rotation.
    pub signing: SigningConfig,

    /// Background expiry sweep.
    pub sweep: SweepConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:5000".to_string(),
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Token and code lifetimes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// How long an authorization code may wait for redemption.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Default access token lifetime. Clients may override it.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Identity token lifetime.
    #[serde(with = "humantime_serde")]
    pub identity_token_lifetime: Duration,

    /// Absolute refresh token lifetime. Rotation does not extend it.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Issue a new refresh token on every refresh and revoke the old one.
    pub refresh_token_rotation: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(300),
            access_token_lifetime: Duration::from_secs(3600),
            identity_token_lifetime: Duration::from_secs(300),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600),
            refresh_token_rotation: true,
        }
    }
}

impl OAuthConfig {
    /// The longest time a token signed now may still be presented.
    #[must_use]
    pub fn longest_signed_token_lifetime(&self) -> Duration {
        self.access_token_lifetime.max(self.identity_token_lifetime)
    }
}

/// Signing key configuration.
///
/// Without `private_key_path` a key is generated at startup. With one, the
/// PEM file (PKCS#8, or PKCS#1/SEC1) is loaded and must match `algorithm`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Algorithm for new signatures.
    pub algorithm: SigningAlgorithm,

    /// PEM file holding the private key.
    pub private_key_path: Option<PathBuf>,

    /// `kid` for a loaded key. Generated keys always get a random one.
    pub key_id: Option<String>,

    /// Generate a fresh key this often. Unset disables scheduled rotation.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Option<Duration>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::RS256,
            private_key_path: None,
            key_id: None,
            rotation_interval: None,
        }
    }
}

/// Expiry sweep configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Time between sweeps.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the issuer is not an absolute http(s) URL,
    /// a lifetime or interval is zero, or a key id is set without a key file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("auth.issuer".to_string()));
        }

        let issuer = url::Url::parse(&self.issuer)
            .map_err(|e| ConfigError::InvalidValue(format!("issuer '{}': {e}", self.issuer)))?;
        if !matches!(issuer.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "issuer must be an http(s) URL, got '{}'",
                self.issuer
            )));
        }
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(ConfigError::InvalidValue(
                "issuer must not carry a query or fragment".to_string(),
            ));
        }

        let lifetimes = [
            (
                "authorization_code_lifetime",
                self.oauth.authorization_code_lifetime,
            ),
            ("access_token_lifetime", self.oauth.access_token_lifetime),
            ("identity_token_lifetime", self.oauth.identity_token_lifetime),
            ("refresh_token_lifetime", self.oauth.refresh_token_lifetime),
            ("sweep.interval", self.sweep.interval),
        ];
        for (name, value) in lifetimes {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        if self.signing.rotation_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidValue(
                "signing.rotation_interval must be > 0".to_string(),
            ));
        }

        if self.signing.key_id.is_some() && self.signing.private_key_path.is_none() {
            return Err(ConfigError::InvalidValue(
                "signing.key_id requires signing.private_key_path".to_string(),
            ));
        }

        Ok(())
    }

    /// Issuer without a trailing slash, ready for joining paths.
    #[must_use]
    pub fn issuer_base(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }
}
