use std::env;
use std::process::ExitCode;

use idsrv_server::ServerBuilder;
use idsrv_server::config::loader::load_config;
use idsrv_server::observability;

const DEFAULT_CONFIG: &str = "idsrv.toml";

#[tokio::main]
async fn main() -> ExitCode {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => eprintln!("ignoring unreadable .env: {err}"),
    }

    observability::init_tracing();

    let (config_path, origin) = config_path_from(env::args().skip(1));
    let cfg = match load_config(Some(&config_path)) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("cannot load {config_path}: {err}");
            return ExitCode::from(2);
        }
    };
    observability::apply_logging_level(&cfg.logging.level);
    tracing::info!(path = %config_path, origin, issuer = %cfg.auth.issuer, "configuration ready");

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(server) => server,
        Err(err) => {
            eprintln!("startup failed: {err}");
            return ExitCode::from(2);
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("server stopped with an error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// `--config <path>` beats `IDSRV_CONFIG`, which beats `idsrv.toml`.
fn config_path_from(mut args: impl Iterator<Item = String>) -> (String, &'static str) {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, "--config");
            }
        }
    }
    match env::var("IDSRV_CONFIG") {
        Ok(path) if !path.is_empty() => (path, "IDSRV_CONFIG"),
        _ => (DEFAULT_CONFIG.to_string(), "default"),
    }
}
