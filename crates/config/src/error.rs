/// Errors raised while loading or validating `config.json`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration file could not be opened.
    #[error("Failed to open configuration file: {0}")]
    ConfigOpen(#[from] std::io::Error),
    /// The configuration file is not valid JSON, or does not match the schema.
    #[error("Failed to parse configuration file: {0}")]
    ConfigParse(#[from] serde_json::Error),
    /// A `${VAR}` placeholder could not be expanded.
    #[error("At {path} failed substituting environment variable: {reason}")]
    EnvVarSubstitution {
        /// JSON pointer to the offending field.
        path: String,
        /// Why the substitution failed.
        reason: String,
    },
    /// A Service referenced a Provider id that does not exist; dropped with this warning.
    #[error("rule '{rule_id}' service referenced unknown provider '{provider_id}', dropped")]
    DanglingProviderReference {
        /// The Rule that held the dangling reference.
        rule_id: uuid::Uuid,
        /// The Provider id that could not be resolved.
        provider_id: uuid::Uuid,
    },
    /// Two Rules share both request-model and scenario, violating the uniqueness invariant.
    #[error("duplicate rule for model '{model}' in scenario '{scenario}' (ids {first} and {second})")]
    DuplicateRule {
        /// The shared request-model string.
        model: String,
        /// The shared scenario.
        scenario: String,
        /// The first rule id seen with this (model, scenario) pair.
        first: uuid::Uuid,
        /// The later rule id, which loses.
        second: uuid::Uuid,
    },
    /// Neither providers nor rules are configured; the proxy would accept but never route.
    #[error("configuration has no providers and no rules: the proxy would accept requests but never route them")]
    NoDownstreams,
}
