//! Provider configuration: upstream endpoints the proxy can dispatch to.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::headers::HeaderRule;

/// Absolute ceiling on a provider's request timeout, regardless of configuration.
pub const MAX_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// The wire dialect a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Dialect {
    /// OpenAI-shaped `/v1/chat/completions`.
    Openai,
    /// Anthropic-shaped `/v1/messages`.
    Anthropic,
    /// Google-shaped generateContent API. Upstream-only: never mounted on ingress.
    Google,
}

/// How the provider client authenticates to the upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProviderAuth {
    /// A static API key sent as a bearer token or dialect-specific header.
    StaticKey {
        /// The secret key material.
        api_key: SecretString,
    },
    /// OAuth-backed credentials managed by the credential vault.
    OAuth {
        /// Client id, may be overridden by `OAUTH_CLIENT_ID`.
        #[serde(default)]
        client_id: Option<String>,
        /// Client secret, may be overridden by `OAUTH_CLIENT_SECRET`.
        #[serde(default)]
        client_secret: Option<SecretString>,
    },
}

/// An upstream LLM endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Provider {
    /// Stable identifier, referenced by [`crate::Service::provider_id`].
    pub id: Uuid,
    /// Human-readable display name.
    pub name: String,
    /// Wire dialect this provider speaks.
    pub dialect: Dialect,
    /// Custom base URL; defaults to the dialect's well-known public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Authentication material.
    pub auth: ProviderAuth,
    /// Outbound proxy URL (`http://` or `socks5://`), if any.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Request timeout, capped at [`MAX_PROVIDER_TIMEOUT`] on load.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_capped_timeout")]
    pub timeout: Duration,
    /// Outbound header transform rules applied to every request sent to this provider.
    #[serde(default)]
    pub headers: Vec<HeaderRule>,
    /// Whether this provider participates in rule resolution.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn deserialize_capped_timeout<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(seconds).min(MAX_PROVIDER_TIMEOUT))
}

impl Provider {
    /// Default public base URL for this provider's dialect.
    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| match self.dialect {
            Dialect::Openai => "https://api.openai.com/v1",
            Dialect::Anthropic => "https://api.anthropic.com/v1",
            Dialect::Google => "https://generativelanguage.googleapis.com/v1beta",
        })
    }
}
