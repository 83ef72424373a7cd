//! `tingly` configuration structures, mapping `config.json`.

#![deny(missing_docs)]

mod auth;
mod headers;
mod http_types;
mod loader;
mod provider;
mod rule;
mod server;
mod telemetry;

pub mod error;

use std::path::Path;

pub use auth::{AuthConfig, AuthMode};
pub use headers::{
    HeaderForward, HeaderInsert, HeaderRemove, HeaderRenameDuplicate, HeaderRule, McpHeaderRule, NameOrPattern,
    NamePattern,
};
pub use http_types::{HeaderName, HeaderValue};
pub use provider::{Dialect, Provider, ProviderAuth, MAX_PROVIDER_TIMEOUT};
pub use rule::{Rule, Scenario, Service, Tactic};
pub use server::{ClientIpConfig, CorsConfig, HealthConfig, ServerConfig, TlsServerConfig};
use serde::Deserialize;
pub use telemetry::OtlpProtocol;
pub use telemetry::exporters::{
    ExportersConfig, GrpcHeaders, HttpHeaders, OtlpExporterConfig, OtlpGrpcConfig, OtlpHttpConfig,
};
pub use telemetry::tracing::{PropagationConfig, TracingConfig};
pub use telemetry::{LogsConfig, MetricsConfig, TelemetryConfig};
use uuid::Uuid;

/// Root configuration document, the parsed shape of `config.json`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Ingress bearer-token authentication.
    pub auth: AuthConfig,
    /// Upstream providers, keyed by their stable id.
    pub providers: Vec<Provider>,
    /// Routing rules.
    pub rules: Vec<Rule>,
    /// Telemetry configuration settings.
    pub telemetry: TelemetryConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            model_token: secrecy::SecretString::from(String::new()),
            virtual_model_token: None,
        }
    }
}

impl Config {
    /// Load configuration from a file path, expanding `${ENV_VAR}` placeholders and
    /// pruning dangling Service -> Provider references (see [`Self::validate`]).
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates referential integrity and that the configuration has at least one
    /// functional downstream. Called automatically by [`Self::load`]; exposed so callers
    /// constructing a `Config` programmatically (e.g. tests) can run the same checks.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        loader::validate(self)
    }

    /// Look up a provider by id.
    pub fn provider(&self, id: Uuid) -> Option<&Provider> {
        self.providers.iter().find(|provider| provider.id == id)
    }

    /// Find the first active rule matching `(request_model, scenario)`.
    pub fn resolve_rule(&self, request_model: &str, scenario: Scenario) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| rule.active && rule.scenario == scenario && rule.request_model == request_model)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_debug_snapshot!(&config);
    }
}
