//! The usage record shape: `{timestamp, rule-id, provider-id, model, input-tokens,
//! output-tokens, latency-ms, status-code, streamed, error-kind?}`.

use jiff::Timestamp;
use uuid::Uuid;

/// One completed (or failed) exchange, ready to be enqueued for persistence.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    /// When the exchange completed.
    pub timestamp: Timestamp,
    /// The Rule that routed this exchange.
    pub rule_id: Uuid,
    /// The Provider the request was dispatched to.
    pub provider_id: Uuid,
    /// The concrete upstream model name used.
    pub model: String,
    /// Input tokens, from the response's usage field or the character-length estimator.
    pub input_tokens: u64,
    /// Output tokens, from the response's usage field or the character-length estimator.
    pub output_tokens: u64,
    /// Whether `input_tokens`/`output_tokens` came from the character-length estimator
    /// rather than the upstream's own usage field.
    pub estimated: bool,
    /// Wall-clock latency of the exchange in milliseconds.
    pub latency_ms: u64,
    /// The status code returned to the client.
    pub status_code: u16,
    /// Whether this exchange was served as a streaming response.
    pub streamed: bool,
    /// The error kind, if the exchange did not complete successfully.
    pub error_kind: Option<String>,
}
