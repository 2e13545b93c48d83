pub mod api;
pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod server;

pub use bootstrap::{BootstrapError, Services, build_services};
pub use config::{ApiConfig, AppConfig, LoggingConfig, ServerConfig};
pub use observability::init_tracing;
pub use server::{IdentityServer, ServerBuilder, build_app};
