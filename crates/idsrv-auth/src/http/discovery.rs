//! Discovery document and JWKS handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::discovery::DiscoveryCache;

const CACHE_CONTROL: &str = "public, max-age=3600";

/// `GET /.well-known/openid-configuration`
pub async fn discovery_handler(State(cache): State<Arc<DiscoveryCache>>) -> impl IntoResponse {
    let document = cache.document();
    (
        [(header::CACHE_CONTROL, CACHE_CONTROL)],
        Json(document.as_ref().clone()),
    )
}

/// `GET /.well-known/openid-configuration/jwks`
///
/// Publishes the active key and every retired key still inside its
/// retention window.
pub async fn jwks_handler(State(cache): State<Arc<DiscoveryCache>>) -> impl IntoResponse {
    let jwks = cache.jwks();
    (
        [(header::CACHE_CONTROL, CACHE_CONTROL)],
        Json(jwks.as_ref().clone()),
    )
}
