use idsrv_auth::config::AuthConfig;
use idsrv_auth::registry::RegistrySeed;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Clients, users and resources. Defaults to the sample fixtures.
    #[serde(default)]
    pub registry: RegistrySeed,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!("logging.level must be one of {LOG_LEVELS:?}"));
        }
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;
        if self.api.audience.is_empty() {
            return Err("api.audience must not be empty".into());
        }
        if let Some(authority) = &self.api.authority {
            url::Url::parse(authority).map_err(|e| format!("api.authority: {e}"))?;
        }
        Ok(())
    }

    /// Listen address; an unparsable host falls back to all interfaces.
    pub fn addr(&self) -> SocketAddr {
        let host = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(host, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The sample resource API mounted at `/api/identity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Audience an access token must carry.
    #[serde(default = "default_api_audience")]
    pub audience: String,
    /// Base URL of the authorization server whose JWKS the API trusts.
    /// When unset the API reads the keys of this process directly.
    #[serde(default)]
    pub authority: Option<String>,
}

fn default_api_audience() -> String {
    "api1".into()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            audience: default_api_audience(),
            authority: None,
        }
    }
}

/// File plus environment loading for [`AppConfig`].
pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::Path;

    const ENV_PREFIX: &str = "IDSRV";

    /// Reads `path` (or `idsrv.toml`) when it exists, then overlays
    /// `IDSRV__SECTION__KEY` variables and validates the result.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let file = Path::new(path.unwrap_or("idsrv.toml"));
        let settings = Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| format!("reading {}: {e}", file.display()))?;
        let cfg: AppConfig = settings
            .try_deserialize()
            .map_err(|e| format!("invalid settings: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
