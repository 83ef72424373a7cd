//! Google dialect client: translates through [`crate::messages::google`]'s wire types
//! and dispatches over HTTP. Google is upstream-only — it is never an ingress dialect —
//! so the key, not a bearer token, goes in the URL's query string.

use async_trait::async_trait;
use config::{Dialect, Provider};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    error::PipelineError,
    http_client::client_for_provider,
    messages::{
        google::GenerateContentRequest,
        unified::{
            UnifiedModel, UnifiedObjectType, UnifiedRequest, UnifiedResponse,
            from_google::{chunk_from_google, response_from_google},
        },
    },
    provider::{ChatCompletionStream, DialectClient, fallback_models, new_id, now},
};

pub(crate) struct GoogleClient;

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

#[derive(Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ListedModel>,
}

#[derive(Deserialize)]
struct ListedModel {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[async_trait]
impl DialectClient for GoogleClient {
    async fn complete(&self, provider: &Provider, token: &SecretString, request: UnifiedRequest) -> Result<UnifiedResponse, PipelineError> {
        let model = request.model.clone();
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            provider.effective_base_url(),
            model,
            token.expose_secret()
        );

        let google_request = GenerateContentRequest::from(request);
        let body = sonic_rs::to_vec(&google_request)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to serialize google request: {e}")))?;

        let client = client_for_provider(provider);
        let request = header_rules::apply(client.request(Method::POST, &url), &provider.headers, &reqwest::header::HeaderMap::new())
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

        let google_response = sonic_rs::from_slice(&bytes)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to parse google response: {e}")))?;

        Ok(response_from_google(google_response, new_id("gemini"), model, now()))
    }

    async fn complete_stream(
        &self,
        provider: &Provider,
        token: &SecretString,
        request: UnifiedRequest,
    ) -> Result<ChatCompletionStream, PipelineError> {
        let model = request.model.clone();
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            provider.effective_base_url(),
            model,
            token.expose_secret()
        );

        let google_request = GenerateContentRequest::from(request);
        let body = sonic_rs::to_vec(&google_request)
            .map_err(|e| PipelineError::InternalInvariant(format!("failed to serialize google request: {e}")))?;

        let client = client_for_provider(provider);
        let request = header_rules::apply(client.request(Method::POST, &url), &provider.headers, &reqwest::header::HeaderMap::new())
            .header("content-type", "application/json")
            .body(body);

        let response = request.send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let id = new_id("gemini");
        let created = now();
        let event_stream = response.bytes_stream().eventsource();

        let chunk_stream = event_stream.filter_map(move |event| {
            let id = id.clone();
            let model = model.clone();

            async move {
                let Ok(event) = event else {
                    log::warn!("SSE parsing error in google stream");
                    return None;
                };

                match sonic_rs::from_str(&event.data) {
                    Ok(raw) => Some(Ok(chunk_from_google(raw, id.into(), model.into(), created))),
                    Err(e) => {
                        log::warn!("failed to parse google stream chunk: {e}");
                        None
                    }
                }
            }
        });

        Ok(Box::pin(chunk_stream))
    }

    async fn list_models(&self, provider: &Provider, token: &SecretString) -> Result<Vec<UnifiedModel>, PipelineError> {
        let url = format!("{}/models?key={}", provider.effective_base_url(), token.expose_secret());
        let client = client_for_provider(provider);

        let response = client.get(&url).send().await;

        let Ok(response) = response else {
            return Ok(fallback_models(Dialect::Google));
        };

        if !response.status().is_success() {
            return Ok(fallback_models(Dialect::Google));
        }

        let Ok(bytes) = response.bytes().await else {
            return Ok(fallback_models(Dialect::Google));
        };

        match sonic_rs::from_slice::<ListModelsResponse>(&bytes) {
            Ok(parsed) => Ok(parsed
                .models
                .into_iter()
                .map(|model| {
                    let id = model.name.strip_prefix("models/").unwrap_or(&model.name).to_string();
                    let display_name = model.display_name.unwrap_or_else(|| id.clone());

                    UnifiedModel {
                        id,
                        object_type: UnifiedObjectType::Model,
                        display_name,
                        created: 0,
                        owned_by: "google".to_string(),
                    }
                })
                .collect()),
            Err(_) => Ok(fallback_models(Dialect::Google)),
        }
    }
}
