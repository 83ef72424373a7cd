//! Rule, Service, Tactic and Scenario: the routing data model.

use serde::Deserialize;
use uuid::Uuid;

/// Tag derived from the ingress path, disambiguating Rules that share a request model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Scenario {
    /// `/openai/*`
    Openai,
    /// `/anthropic/*`
    Anthropic,
    /// `/tingly/cc/v1/messages` (default claude-code entrypoint)
    ClaudeCode,
    /// `/tingly/cc/haiku/v1/messages`
    ClaudeCodeHaiku,
    /// `/tingly/cc/sonnet/v1/messages`
    ClaudeCodeSonnet,
    /// `/tingly/cc/opus/v1/messages`
    ClaudeCodeOpus,
    /// `/tingly/cc/default/v1/messages`
    ClaudeCodeDefault,
    /// `/tingly/cc/subagent/v1/messages`
    ClaudeCodeSubagent,
    /// `/opencode/*`
    Opencode,
}

impl Scenario {
    /// Derive the scenario from an ingress request path, and the header override if present.
    ///
    /// `/openai/*` and `/anthropic/*` map to the protocol-named scenarios; `/tingly/cc/*`
    /// maps to one of the claude-code sub-scenarios based on the path segment following
    /// `cc`; `/opencode/*` maps to [`Scenario::Opencode`]. An `x-tingly-scenario` header
    /// overrides path-based detection when present and valid.
    pub fn from_path_prefix(path: &str, header_override: Option<&str>) -> Option<Self> {
        if let Some(header) = header_override
            && let Ok(scenario) = header.parse()
        {
            return Some(scenario);
        }

        let mut segments = path.trim_start_matches('/').split('/');

        match segments.next()? {
            "openai" => Some(Self::Openai),
            "anthropic" => Some(Self::Anthropic),
            "opencode" => Some(Self::Opencode),
            "tingly" => match segments.next()? {
                "cc" => match segments.next() {
                    Some("haiku") => Some(Self::ClaudeCodeHaiku),
                    Some("sonnet") => Some(Self::ClaudeCodeSonnet),
                    Some("opus") => Some(Self::ClaudeCodeOpus),
                    Some("default") => Some(Self::ClaudeCodeDefault),
                    Some("subagent") => Some(Self::ClaudeCodeSubagent),
                    _ => Some(Self::ClaudeCode),
                },
                _ => None,
            },
            _ => None,
        }
    }
}

/// Load-balancing policy controlling when a Rule rotates to its next Service.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Tactic {
    /// Rotate after `request_threshold` calls through the current service.
    RoundRobin {
        /// Number of requests served by a service before rotation. `1` is plain round-robin.
        request_threshold: u32,
    },
    /// Rotate once accumulated output tokens since the last rotation reach `token_threshold`.
    TokenBased {
        /// Output-token budget per service before rotation.
        token_threshold: u64,
    },
    /// Rotate when either threshold is reached; both counters reset on rotation.
    Hybrid {
        /// Request-count threshold.
        request_threshold: u32,
        /// Output-token threshold.
        token_threshold: u64,
    },
    /// Pick uniformly at random; stateless.
    Random {},
}

impl Default for Tactic {
    fn default() -> Self {
        Self::RoundRobin { request_threshold: 1 }
    }
}

/// A concrete (Provider, model) pair belonging to a Rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    /// References [`crate::Provider::id`]. Dangling references are dropped on load.
    pub provider_id: Uuid,
    /// The concrete upstream model name, substituted for the virtual model at dispatch.
    pub model: String,
    /// Relative selection weight. Currently informational; tactics rotate in list order.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Whether this service currently participates in rotation.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// A binding from a client-facing virtual model name and scenario to an ordered list
/// of Services.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Stable identifier.
    pub id: Uuid,
    /// The model name clients request.
    pub request_model: String,
    /// Overrides the `model` field echoed back to the client, if set.
    #[serde(default)]
    pub response_model: Option<String>,
    /// Which ingress scenario this rule applies to.
    pub scenario: Scenario,
    /// Ordered candidate services.
    pub services: Vec<Service>,
    /// Load-balancing policy.
    #[serde(default)]
    pub tactic: Tactic,
    /// Whether this rule participates in resolution.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Rule {
    /// Services currently eligible for selection.
    pub fn active_services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter().filter(|service| service.active)
    }
}
