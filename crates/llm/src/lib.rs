//! The request pipeline's ingress surface: one axum router mounting every dialect this
//! proxy accepts, each handler translating to/from [`messages::unified`] and handing
//! off to [`pipeline::Pipeline::run`].

mod error;
mod http_client;
mod messages;
mod pipeline;
mod provider;
pub mod token_counter;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use axum_serde::Sonic;
use config::{AuthConfig, Config, Scenario};
use context::RequestContext;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ErrorDialect, PipelineError},
    messages::{
        anthropic::{self, AnthropicChatRequest},
        openai::{self, ChatCompletionRequest},
        unified::{UnifiedModelsResponse, UnifiedObjectType, UnifiedRequest},
    },
    pipeline::{Pipeline, PipelineBuilder, PipelineOutcome},
};

struct HandlerState {
    pipeline: Pipeline,
    auth: AuthConfig,
    shutdown: CancellationToken,
}

/// Assembles the ingress router: every mount listed in the external interfaces, wired
/// unconditionally (there is no per-protocol enable/disable toggle in this design).
pub fn router(
    config: Config,
    vault: vault::Vault,
    recorder: usage::Recorder,
    rotation_store: routing::SqliteRotationStore,
    shutdown: CancellationToken,
) -> Router {
    let auth = config.auth.clone();
    let pipeline = PipelineBuilder::new(config, vault, recorder, rotation_store).build();
    let state = Arc::new(HandlerState { pipeline, auth, shutdown });

    Router::new()
        .route("/openai/v1/chat/completions", post(openai_chat_completions))
        .route("/openai/v1/models", get(openai_list_models))
        .route("/anthropic/v1/messages", post(anthropic_messages))
        .route("/anthropic/v1/models", get(anthropic_list_models))
        .route("/tingly/cc/v1/messages", post(claude_code_messages))
        .route("/tingly/cc/haiku/v1/messages", post(claude_code_haiku_messages))
        .route("/tingly/cc/sonnet/v1/messages", post(claude_code_sonnet_messages))
        .route("/tingly/cc/opus/v1/messages", post(claude_code_opus_messages))
        .route("/tingly/cc/default/v1/messages", post(claude_code_default_messages))
        .route("/tingly/cc/subagent/v1/messages", post(claude_code_subagent_messages))
        .route("/opencode/v1/messages", post(opencode_messages))
        .with_state(state)
}

/// Extracts the bearer token from `Authorization: Bearer <token>` or `x-api-key`,
/// accepted interchangeably on every endpoint.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION)
        && let Ok(s) = value.to_str()
        && let Some(token) = s.strip_prefix("Bearer ")
    {
        return Some(token.to_string());
    }

    headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Runs stages 1-2: authenticate the bearer token, then identify the scenario from
/// `path` (and the `x-tingly-scenario` header override, when present).
fn authenticate_and_identify(state: &HandlerState, headers: &HeaderMap, path: &str) -> Result<RequestContext, PipelineError> {
    let token = extract_token(headers).ok_or(PipelineError::AuthMissing)?;
    let auth_mode = state.auth.authenticate(&token).ok_or(PipelineError::AuthInvalid)?;

    let header_override = headers.get("x-tingly-scenario").and_then(|v| v.to_str().ok());
    let scenario = Scenario::from_path_prefix(path, header_override)
        .ok_or_else(|| PipelineError::InternalInvariant(format!("unresolvable scenario for path '{path}'")))?;

    Ok(RequestContext::new(auth_mode, scenario, &state.shutdown))
}

/// Handle OpenAI-shaped `/v1/chat/completions`, streaming or unary.
async fn openai_chat_completions(
    State(state): State<Arc<HandlerState>>,
    headers: HeaderMap,
    Sonic(request): Sonic<ChatCompletionRequest>,
) -> Response {
    let context = match authenticate_and_identify(&state, &headers, "/openai/v1/chat/completions") {
        Ok(context) => context,
        Err(e) => return e.into_response_for(ErrorDialect::Openai),
    };

    let streaming = request.stream.unwrap_or(false);
    let unified_request = UnifiedRequest::from(request);

    match state.pipeline.run(unified_request, &context).await {
        Ok(PipelineOutcome::Unary(response)) => {
            let openai_response = openai::ChatCompletionResponse::from(response);
            axum::Json(openai_response).into_response()
        }
        Ok(PipelineOutcome::Streaming(stream)) => {
            debug_assert!(streaming, "pipeline only streams when the request asked for it");

            let event_stream = stream.map(|result| {
                let event = match result {
                    Ok(chunk) => {
                        let openai_chunk = openai::ChatCompletionChunk::from(chunk);
                        let json = sonic_rs::to_string(&openai_chunk).unwrap_or_else(|e| {
                            log::error!("failed to serialize openai chunk: {e}");
                            r#"{"error":"serialization failed"}"#.to_string()
                        });
                        Event::default().data(json)
                    }
                    Err(e) => Event::default().data(e.mid_stream_event_json(ErrorDialect::Openai).to_string()),
                };

                Ok::<_, std::convert::Infallible>(event)
            });

            let with_done = event_stream.chain(futures::stream::once(async {
                Ok::<_, std::convert::Infallible>(Event::default().data("[DONE]"))
            }));

            Sse::new(with_done).into_response()
        }
        Err(e) => e.into_response_for(ErrorDialect::Openai),
    }
}

/// Handle `/v1/models`, aggregating the catalog across every configured provider.
async fn openai_list_models(State(state): State<Arc<HandlerState>>) -> Response {
    let models = state.pipeline.list_models().await;
    let response = openai::ModelsResponse::from(UnifiedModelsResponse {
        object_type: UnifiedObjectType::List,
        data: models,
    });

    axum::Json(response).into_response()
}

/// Shared body for every Anthropic-wire-shaped ingress route (`/anthropic/v1/messages`
/// and every `tingly/cc`/`opencode` sibling): they differ only in which path (and thus
/// which default [`Scenario`]) they're mounted under.
async fn anthropic_like(state: &Arc<HandlerState>, headers: &HeaderMap, path: &str, request: AnthropicChatRequest) -> Response {
    let context = match authenticate_and_identify(state, headers, path) {
        Ok(context) => context,
        Err(e) => return e.into_response_for(ErrorDialect::Anthropic),
    };

    let unified_request = UnifiedRequest::from(request);
    let streaming = unified_request.stream.unwrap_or(false);

    match state.pipeline.run(unified_request, &context).await {
        Ok(PipelineOutcome::Unary(response)) => {
            let anthropic_response = anthropic::AnthropicChatResponse::from(response);
            axum::Json(anthropic_response).into_response()
        }
        Ok(PipelineOutcome::Streaming(stream)) => {
            debug_assert!(streaming, "pipeline only streams when the request asked for it");

            let event_stream = stream.map(|result| {
                let event = match result {
                    Ok(chunk) => {
                        let anthropic_event = anthropic::AnthropicStreamEvent::from(chunk);
                        let json = sonic_rs::to_string(&anthropic_event).unwrap_or_else(|e| {
                            log::error!("failed to serialize anthropic stream event: {e}");
                            r#"{"type":"error","error":{"type":"internal_error","message":"serialization failed"}}"#.to_string()
                        });
                        Event::default().data(json)
                    }
                    Err(e) => Event::default().data(e.mid_stream_event_json(ErrorDialect::Anthropic).to_string()),
                };

                Ok::<_, std::convert::Infallible>(event)
            });

            // Anthropic's streaming convention has no terminal sentinel: the stream just ends.
            Sse::new(event_stream).into_response()
        }
        Err(e) => e.into_response_for(ErrorDialect::Anthropic),
    }
}

async fn anthropic_messages(State(state): State<Arc<HandlerState>>, headers: HeaderMap, Sonic(request): Sonic<AnthropicChatRequest>) -> Response {
    anthropic_like(&state, &headers, "/anthropic/v1/messages", request).await
}

async fn claude_code_messages(State(state): State<Arc<HandlerState>>, headers: HeaderMap, Sonic(request): Sonic<AnthropicChatRequest>) -> Response {
    anthropic_like(&state, &headers, "/tingly/cc/v1/messages", request).await
}

async fn claude_code_haiku_messages(
    State(state): State<Arc<HandlerState>>,
    headers: HeaderMap,
    Sonic(request): Sonic<AnthropicChatRequest>,
) -> Response {
    anthropic_like(&state, &headers, "/tingly/cc/haiku/v1/messages", request).await
}

async fn claude_code_sonnet_messages(
    State(state): State<Arc<HandlerState>>,
    headers: HeaderMap,
    Sonic(request): Sonic<AnthropicChatRequest>,
) -> Response {
    anthropic_like(&state, &headers, "/tingly/cc/sonnet/v1/messages", request).await
}

async fn claude_code_opus_messages(
    State(state): State<Arc<HandlerState>>,
    headers: HeaderMap,
    Sonic(request): Sonic<AnthropicChatRequest>,
) -> Response {
    anthropic_like(&state, &headers, "/tingly/cc/opus/v1/messages", request).await
}

async fn claude_code_default_messages(
    State(state): State<Arc<HandlerState>>,
    headers: HeaderMap,
    Sonic(request): Sonic<AnthropicChatRequest>,
) -> Response {
    anthropic_like(&state, &headers, "/tingly/cc/default/v1/messages", request).await
}

async fn claude_code_subagent_messages(
    State(state): State<Arc<HandlerState>>,
    headers: HeaderMap,
    Sonic(request): Sonic<AnthropicChatRequest>,
) -> Response {
    anthropic_like(&state, &headers, "/tingly/cc/subagent/v1/messages", request).await
}

async fn opencode_messages(State(state): State<Arc<HandlerState>>, headers: HeaderMap, Sonic(request): Sonic<AnthropicChatRequest>) -> Response {
    anthropic_like(&state, &headers, "/opencode/v1/messages", request).await
}

/// Handle Anthropic-shaped `/v1/models`.
async fn anthropic_list_models(State(state): State<Arc<HandlerState>>) -> Response {
    let models = state.pipeline.list_models().await;
    let response = anthropic::AnthropicModelsResponse::from(UnifiedModelsResponse {
        object_type: UnifiedObjectType::List,
        data: models,
    });

    axum::Json(response).into_response()
}
