//! Anthropic dialect client: translates through [`crate::messages::anthropic`]'s wire
//! types and dispatches over HTTP.

use async_trait::async_trait;
use config::{Dialect, Provider};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Method, StatusCode, header::CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::PipelineError,
    http_client::client_for_provider,
    messages::{
        anthropic::{AnthropicChatRequest, AnthropicChatResponse, AnthropicModelsResponse, AnthropicStreamEvent},
        unified::{StreamTranslator, UnifiedModel, UnifiedRequest, UnifiedResponse},
    },
    provider::{ChatCompletionStream, DialectClient, fallback_models},
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) struct AnthropicClient;

fn map_send_error(e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::UpstreamTimeout
    } else {
        PipelineError::UpstreamStatus {
            status: StatusCode::BAD_GATEWAY,
            body: e.to_string(),
        }
    }
}

async fn error_for_status(response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
    PipelineError::UpstreamStatus { status, body }
}

#[async_trait]
impl DialectClient for AnthropicClient {
    async fn complete(&self, provider: &Provider, token: &SecretString, request: UnifiedRequest) -> Result<UnifiedResponse, PipelineError> {
        let url = format!("{}/messages", provider.effective_base_url());
        let anthropic_request = AnthropicChatRequest::from(request);

        let body = sonic_rs::to_vec(&anthropic_request)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to serialize anthropic request: {e}")))?;

        let client = client_for_provider(provider);
        let request = header_rules::apply(client.request(Method::POST, &url), &provider.headers, &reqwest::header::HeaderMap::new())
            .header("x-api-key", token.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        let response = request.send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::UpstreamStatus {
                status: StatusCode::BAD_GATEWAY,
                body: e.to_string(),
            })?;

        let anthropic_response: AnthropicChatResponse = sonic_rs::from_slice(&bytes)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to parse anthropic response: {e}")))?;

        Ok(UnifiedResponse::from(anthropic_response))
    }

    async fn complete_stream(
        &self,
        provider: &Provider,
        token: &SecretString,
        mut request: UnifiedRequest,
    ) -> Result<ChatCompletionStream, PipelineError> {
        request.stream = Some(true);

        let url = format!("{}/messages", provider.effective_base_url());
        let anthropic_request = AnthropicChatRequest::from(request);

        let body = sonic_rs::to_vec(&anthropic_request)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to serialize anthropic request: {e}")))?;

        let client = client_for_provider(provider);
        let request = header_rules::apply(client.request(Method::POST, &url), &provider.headers, &reqwest::header::HeaderMap::new())
            .header("x-api-key", token.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        let response = request.send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let event_stream = response.bytes_stream().eventsource();

        let chunk_stream = futures::stream::unfold(
            (Box::pin(event_stream), StreamTranslator::new(), std::collections::VecDeque::new()),
            |(mut stream, mut translator, mut pending)| async move {
                loop {
                    if let Some(chunk) = pending.pop_front() {
                        return Some((Ok(chunk), (stream, translator, pending)));
                    }

                    let event = stream.next().await?;

                    let Ok(event) = event else {
                        log::warn!("SSE parsing error in anthropic stream");
                        continue;
                    };

                    let Ok(anthropic_event) = sonic_rs::from_str::<AnthropicStreamEvent>(&event.data) else {
                        log::warn!("failed to parse anthropic stream event: {}", event.data);
                        continue;
                    };

                    match anthropic_event {
                        AnthropicStreamEvent::MessageStop => return None,
                        AnthropicStreamEvent::Ping => continue,
                        AnthropicStreamEvent::Error { error } => {
                            log::error!("anthropic stream error event: {} - {}", error.error_type, error.message);
                            continue;
                        }
                        // Content-block starts/deltas/stops all flow through the translator,
                        // which buffers a tool call's `input_json_delta` fragments until its
                        // block closes rather than forwarding each as a completed argument.
                        event => pending.extend(translator.translate(event)),
                    }
                }
            },
        );

        Ok(Box::pin(chunk_stream))
    }

    async fn list_models(&self, provider: &Provider, token: &SecretString) -> Result<Vec<UnifiedModel>, PipelineError> {
        let url = format!("{}/models", provider.effective_base_url());
        let client = client_for_provider(provider);

        let response = client
            .get(&url)
            .header("x-api-key", token.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await;

        let Ok(response) = response else {
            return Ok(fallback_models(Dialect::Anthropic));
        };

        if !response.status().is_success() {
            return Ok(fallback_models(Dialect::Anthropic));
        }

        let Ok(bytes) = response.bytes().await else {
            return Ok(fallback_models(Dialect::Anthropic));
        };

        match sonic_rs::from_slice::<AnthropicModelsResponse>(&bytes) {
            Ok(parsed) => Ok(parsed.data.into_iter().map(UnifiedModel::from).collect()),
            Err(_) => Ok(fallback_models(Dialect::Anthropic)),
        }
    }
}
