//! CORS layer construction from [`config::CorsConfig`].

use config::CorsConfig;
use tower_http::cors::{Any, CorsLayer};

/// Builds a [`CorsLayer`] from the configured origin allow-list. An empty list sends no
/// CORS headers at all (browsers cross-origin requests simply fail), rather than the
/// permissive-by-default behavior of a bare [`CorsLayer::permissive`].
pub fn new_layer(config: &CorsConfig) -> CorsLayer {
    if config.allow_origins.is_empty() {
        return CorsLayer::new();
    }

    let origins: Vec<_> = config
        .allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let mut layer = CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any);

    if config.allow_credentials {
        layer = layer.allow_credentials(true);
    }

    layer
}
