//! CORS layer configuration.

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use viewgate_core::config::app::CorsConfig;

/// Builds a CORS tower layer from configuration.
///
/// Only reads are exposed over plain HTTP, so `GET` is the sole allowed method.
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    layer.allow_origin(origins)
}
