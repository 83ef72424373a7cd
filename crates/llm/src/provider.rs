//! Provider dispatch: translating a [`UnifiedRequest`][crate::messages::unified::UnifiedRequest]
//! to/from one upstream dialect's wire format and sending it over HTTP.

pub(crate) mod anthropic;
pub(crate) mod google;
pub(crate) mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use config::{Dialect, Provider};
use futures::Stream;
use secrecy::SecretString;

use crate::{
    error::PipelineError,
    messages::unified::{UnifiedChunk, UnifiedModel, UnifiedRequest, UnifiedResponse},
};

/// A stream of incremental response chunks, already translated to the unified
/// representation, yielded as they arrive from the upstream.
pub(crate) type ChatCompletionStream = Pin<Box<dyn Stream<Item = Result<UnifiedChunk, PipelineError>> + Send>>;

/// One upstream dialect's request/response translation and HTTP dispatch.
#[async_trait]
pub(crate) trait DialectClient: Send + Sync {
    /// Send a non-streaming completion request.
    async fn complete(&self, provider: &Provider, token: &SecretString, request: UnifiedRequest) -> Result<UnifiedResponse, PipelineError>;

    /// Send a streaming completion request.
    async fn complete_stream(
        &self,
        provider: &Provider,
        token: &SecretString,
        request: UnifiedRequest,
    ) -> Result<ChatCompletionStream, PipelineError>;

    /// List the models this provider currently exposes, falling back to a static
    /// catalog entry when the provider's own endpoint doesn't support listing.
    async fn list_models(&self, provider: &Provider, token: &SecretString) -> Result<Vec<UnifiedModel>, PipelineError>;
}

/// The dialect client implementing `dialect`'s wire format.
pub(crate) fn client_for(dialect: Dialect) -> &'static dyn DialectClient {
    match dialect {
        Dialect::Openai => &openai::OpenaiClient,
        Dialect::Anthropic => &anthropic::AnthropicClient,
        Dialect::Google => &google::GoogleClient,
    }
}

/// Small built-in catalog used when a provider's `ListModels` endpoint 404s/405s,
/// letting the models endpoint degrade gracefully instead of failing outright.
pub(crate) fn fallback_models(dialect: Dialect) -> Vec<UnifiedModel> {
    use crate::messages::unified::UnifiedObjectType;

    let (owned_by, ids): (&str, &[&str]) = match dialect {
        Dialect::Openai => ("openai", &["gpt-4o", "gpt-4o-mini", "o1", "o1-mini"]),
        Dialect::Anthropic => (
            "anthropic",
            &["claude-opus-4-20250514", "claude-sonnet-4-20250514", "claude-3-5-haiku-20241022"],
        ),
        Dialect::Google => ("google", &["gemini-2.0-flash", "gemini-1.5-pro", "gemini-1.5-flash"]),
    };

    ids.iter()
        .map(|id| UnifiedModel {
            id: id.to_string(),
            object_type: UnifiedObjectType::Model,
            display_name: id.to_string(),
            created: 0,
            owned_by: owned_by.to_string(),
        })
        .collect()
}

/// A fresh synthetic completion id, for dialects (Google) that don't issue their own.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

/// Current unix timestamp in seconds, for dialects that don't stamp their own responses.
pub(crate) fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
