//! HTTP server configuration settings.

use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on. Defaults to `127.0.0.1:8890`.
    pub listen_address: Option<SocketAddr>,
    /// TLS configuration for secure connections.
    pub tls: Option<TlsServerConfig>,
    /// Health endpoint configuration.
    pub health: HealthConfig,
    /// CORS configuration.
    pub cors: Option<CorsConfig>,
    /// Client IP configuration, used only for usage-record attribution.
    pub client_ip: ClientIpConfig,
}

/// TLS configuration for the ingress listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsServerConfig {
    /// Path to the PEM certificate chain.
    pub certificate: String,
    /// Path to the PEM private key.
    pub key: String,
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is mounted.
    pub enabled: bool,
    /// Listen on a separate address instead of the main router, if set.
    pub listen: Option<SocketAddr>,
    /// Path the health endpoint is served under.
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: None,
            path: "/health".to_string(),
        }
    }
}

/// CORS configuration for the ingress listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins. Empty means no CORS headers are sent.
    pub allow_origins: Vec<String>,
    /// Allow credentialed requests (cookies, auth headers) from the above origins.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            allow_credentials: false,
        }
    }
}

/// Configuration for extracting client IP from headers, attached to usage records only.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ClientIpConfig {
    /// Whether the `X-Real-IP` header should be trusted.
    pub x_real_ip: bool,
    /// How many trusted hops to skip when reading `X-Forwarded-For`.
    /// If `None`, `X-Forwarded-For` is not used.
    pub x_forwarded_for_trusted_hops: Option<usize>,
}
