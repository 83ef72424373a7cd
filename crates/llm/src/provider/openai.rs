//! OpenAI dialect client: translates through [`crate::messages::openai`]'s wire types
//! and dispatches over HTTP.

use async_trait::async_trait;
use config::{Dialect, Provider};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Method, StatusCode, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::PipelineError,
    http_client::client_for_provider,
    messages::{
        openai::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ModelsResponse},
        unified::{UnifiedChunk, UnifiedModel, UnifiedObjectType, UnifiedRequest, UnifiedResponse},
    },
    provider::{ChatCompletionStream, DialectClient, fallback_models},
};

pub(crate) struct OpenaiClient;

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
impl DialectClient for OpenaiClient {
    async fn complete(&self, provider: &Provider, token: &SecretString, request: UnifiedRequest) -> Result<UnifiedResponse, PipelineError> {
        let url = format!("{}/chat/completions", provider.effective_base_url());
        let mut openai_request = ChatCompletionRequest::from(request);
        openai_request.stream = Some(false);

        let body = sonic_rs::to_vec(&openai_request)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to serialize openai request: {e}")))?;

        let client = client_for_provider(provider);
        let request = header_rules::apply(client.request(Method::POST, &url), &provider.headers, &reqwest::header::HeaderMap::new())
            .header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()))
            .header("content-type", "application/json")
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

        let openai_response: ChatCompletionResponse = sonic_rs::from_slice(&bytes)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to parse openai response: {e}")))?;

        Ok(UnifiedResponse::from(openai_response))
    }

    async fn complete_stream(
        &self,
        provider: &Provider,
        token: &SecretString,
        request: UnifiedRequest,
    ) -> Result<ChatCompletionStream, PipelineError> {
        let url = format!("{}/chat/completions", provider.effective_base_url());
        let mut openai_request = ChatCompletionRequest::from(request);
        openai_request.stream = Some(true);

        let body = sonic_rs::to_vec(&openai_request)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to serialize openai request: {e}")))?;

        let client = client_for_provider(provider);
        let request = header_rules::apply(client.request(Method::POST, &url), &provider.headers, &reqwest::header::HeaderMap::new())
            .header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()))
            .header("content-type", "application/json")
            .body(body);

        let response = request.send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let event_stream = response.bytes_stream().eventsource();

        let chunk_stream = event_stream.filter_map(move |event| async move {
            let Ok(event) = event else {
                log::warn!("SSE parsing error in openai stream");
                return None;
            };

            if event.data == "[DONE]" {
                return None;
            }

            match sonic_rs::from_str::<ChatCompletionChunk>(&event.data) {
                Ok(chunk) => Some(Ok(UnifiedChunk::from(chunk))),
                Err(e) => {
                    log::warn!("failed to parse openai stream chunk: {e}");
                    None
                }
            }
        });

        Ok(Box::pin(chunk_stream))
    }

    async fn list_models(&self, provider: &Provider, token: &SecretString) -> Result<Vec<UnifiedModel>, PipelineError> {
        let url = format!("{}/models", provider.effective_base_url());
        let client = client_for_provider(provider);

        let response = client.get(&url).bearer_auth(token.expose_secret()).send().await;

        let Ok(response) = response else {
            return Ok(fallback_models(Dialect::Openai));
        };

        if !response.status().is_success() {
            return Ok(fallback_models(Dialect::Openai));
        }

        let Ok(bytes) = response.bytes().await else {
            return Ok(fallback_models(Dialect::Openai));
        };

        match sonic_rs::from_slice::<ModelsResponse>(&bytes) {
            Ok(parsed) => Ok(parsed
                .data
                .into_iter()
                .map(|model| UnifiedModel {
                    display_name: model.id.clone(),
                    id: model.id,
                    object_type: UnifiedObjectType::Model,
                    created: model.created,
                    owned_by: model.owned_by,
                })
                .collect()),
            Err(_) => Ok(fallback_models(Dialect::Openai)),
        }
    }
}
