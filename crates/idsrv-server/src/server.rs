use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Span;
use tracing::field::Empty;

use crate::api;
use crate::bootstrap::{BootstrapError, Services, build_services};
use crate::config::AppConfig;

pub struct IdentityServer {
    addr: SocketAddr,
    app: Router,
    services: Services,
}

/// Builds the full application: identity endpoints, sample API, middleware.
pub async fn build_app(cfg: &AppConfig) -> Result<(Router, Services), BootstrapError> {
    let services = build_services(&cfg.auth, cfg.registry.clone()).await?;
    let validator = api::resource_validator(
        &cfg.api,
        cfg.auth.issuer_base(),
        Arc::clone(&services.keys),
    );

    let body_limit = cfg.server.body_limit_bytes;
    let app = idsrv_auth::router(services.state.clone())
        .merge(api::routes(Arc::new(validator)))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(record_response),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit));

    Ok((app, services))
}

// Path only: authorize query strings carry state and nonce.
fn request_span(req: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        status = Empty,
    )
}

fn record_response(res: &Response<Body>, latency: Duration, span: &Span) {
    let status = res.status().as_u16();
    span.record("status", status);
    tracing::info!(status, latency_ms = latency.as_millis() as u64, "request handled");
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> Result<IdentityServer, BootstrapError> {
        let (app, services) = build_app(&self.config).await?;
        Ok(IdentityServer {
            addr: self.addr,
            app,
            services,
        })
    }
}

impl IdentityServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "identity server listening");
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.services.shutdown();
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
