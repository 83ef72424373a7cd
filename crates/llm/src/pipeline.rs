//! The request pipeline: resolve rule, select service, fetch credential, translate,
//! dispatch, relay, record. Authentication and scenario identification happen in
//! `llm::router` before a [`UnifiedRequest`] ever reaches [`Pipeline::run`].

mod builder;

pub(crate) use builder::PipelineBuilder;

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use config::Config;
use context::RequestContext;
use fastrace::{future::FutureExt, prelude::LocalSpan};
use futures::Stream;
use jiff::Timestamp;
use pin_project::{pin_project, pinned_drop};
use routing::{LoadBalancer, Selection, SqliteRotationStore};
use uuid::Uuid;

use crate::{
    error::PipelineError,
    messages::unified::{UnifiedChunk, UnifiedRequest, UnifiedResponse},
    provider::{self, ChatCompletionStream},
    token_counter,
};

/// Either a complete response or a stream of chunks, handed back to `llm::router` for
/// dialect-specific re-encoding.
pub(crate) enum PipelineOutcome {
    /// A unary completion.
    Unary(UnifiedResponse),
    /// A streaming completion, already instrumented to record usage when it ends.
    Streaming(ChatCompletionStream),
}

/// Owns the resources shared across every request: routing configuration, the load
/// balancer's rotation state, the credential vault, and the usage recorder.
pub(crate) struct Pipeline {
    config: Config,
    balancer: Arc<LoadBalancer<SqliteRotationStore>>,
    vault: vault::Vault,
    recorder: usage::Recorder,
}

impl Pipeline {
    /// Aggregates the model catalog across every configured provider, skipping any
    /// provider whose credential or `ListModels` call fails rather than failing the
    /// whole request — a single misconfigured provider shouldn't blank the catalog.
    pub(crate) async fn list_models(&self) -> Vec<crate::messages::unified::UnifiedModel> {
        let mut models = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for provider in &self.config.providers {
            let token = match self.vault.token(provider).await {
                Ok(token) => token,
                Err(e) => {
                    log::warn!("skipping provider '{}' in model listing: {e}", provider.id);
                    continue;
                }
            };

            let client = provider::client_for(provider.dialect);
            match client.list_models(provider, &token).await {
                Ok(provider_models) => {
                    for model in provider_models {
                        if seen.insert(model.id.clone()) {
                            models.push(model);
                        }
                    }
                }
                Err(e) => log::warn!("failed to list models for provider '{}': {e}", provider.id),
            }
        }

        models
    }

    /// Run stages 3-9 of the request pipeline (stages 1-2, authenticate and identify
    /// scenario, already happened by the time `context` was constructed).
    pub(crate) async fn run(&self, request: UnifiedRequest, context: &RequestContext) -> Result<PipelineOutcome, PipelineError> {
        let span = telemetry::tracing::create_child_span("llm.pipeline.run", context.span_context);
        span.add_property(|| ("gen_ai.request.model", request.model.clone()));

        self.run_inner(request, context).in_span(span).await
    }

    async fn run_inner(&self, request: UnifiedRequest, context: &RequestContext) -> Result<PipelineOutcome, PipelineError> {
        let start = Instant::now();
        let request_model = request.model.clone();

        let rule = self
            .config
            .resolve_rule(&request_model, context.scenario)
            .ok_or_else(|| PipelineError::UnknownModel(request_model.clone()))?;

        let selection = self.balancer.select(rule).map_err(|e| map_routing_error(e, &request_model))?;

        let provider = self.config.provider(selection.provider_id).ok_or_else(|| {
            PipelineError::InternalInvariant(format!("selection references unknown provider {}", selection.provider_id))
        })?;

        if context.is_dry_run() {
            return self.run_dry_run(request, rule, selection, start).await;
        }

        let token = self.vault.token(provider).await?;

        let mut upstream_request = request;
        upstream_request.model = selection.model.clone();
        let streaming = upstream_request.stream.unwrap_or(false);
        let client = provider::client_for(provider.dialect);

        let response_model = rule.response_model.clone();

        if streaming {
            match select_on_cancellation(context, client.complete_stream(provider, &token, upstream_request)).await {
                Ok(stream) => Ok(PipelineOutcome::Streaming(Box::pin(InstrumentedStream {
                    inner: stream,
                    recorder: self.recorder.clone(),
                    balancer: self.balancer.clone(),
                    rule: rule.clone(),
                    selection: selection.clone(),
                    provider_id: selection.provider_id,
                    model: selection.model.clone(),
                    response_model,
                    start,
                    input_tokens: 0,
                    output_chars: 0,
                    output_tokens_from_usage: None,
                    finished: false,
                    errored: false,
                }))),
                Err(e) => {
                    self.advance_rotation(rule, &selection, 0, false);
                    self.record_failure(rule.id, selection.provider_id, &selection.model, start, true, &e);
                    Err(e)
                }
            }
        } else {
            let estimated_prompt_tokens = u64::from(token_counter::estimate_prompt_tokens(&upstream_request));

            match select_on_cancellation(context, client.complete(provider, &token, upstream_request)).await {
                Ok(mut response) => {
                    let output_tokens = u64::from(response.usage.completion_tokens);
                    self.advance_rotation(rule, &selection, output_tokens, true);
                    self.record_success(rule.id, &selection, &response, estimated_prompt_tokens, start, false);

                    if let Some(name) = response_model {
                        response.model = name;
                    }

                    Ok(PipelineOutcome::Unary(response))
                }
                Err(e) => {
                    self.advance_rotation(rule, &selection, 0, false);
                    self.record_failure(rule.id, selection.provider_id, &selection.model, start, false, &e);
                    Err(e)
                }
            }
        }
    }

    async fn run_dry_run(
        &self,
        request: UnifiedRequest,
        rule: &config::Rule,
        selection: Selection,
        start: Instant,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut response = synthesize_dry_run_response(&request, &selection);
        self.advance_rotation(rule, &selection, 0, true);

        if let Some(name) = &rule.response_model {
            response.model = name.clone();
        }

        self.recorder.record(usage::UsageRecord {
            timestamp: Timestamp::now(),
            rule_id: rule.id,
            provider_id: selection.provider_id,
            model: selection.model,
            input_tokens: 0,
            output_tokens: 0,
            estimated: false,
            latency_ms: start.elapsed().as_millis() as u64,
            status_code: 200,
            streamed: false,
            error_kind: None,
        });

        Ok(PipelineOutcome::Unary(response))
    }

    fn advance_rotation(&self, rule: &config::Rule, selection: &Selection, output_tokens: u64, success: bool) {
        if let Err(e) = self.balancer.record_outcome(rule, selection, output_tokens, success) {
            log::error!("failed to record load balancer outcome: {e}");
        }
    }

    fn record_success(
        &self,
        rule_id: Uuid,
        selection: &Selection,
        response: &UnifiedResponse,
        estimated_prompt_tokens: u64,
        start: Instant,
        streamed: bool,
    ) {
        let estimated = response.usage.prompt_tokens == 0 && response.usage.completion_tokens == 0;
        let (input_tokens, output_tokens) = if estimated {
            let messages: Vec<_> = response.choices.iter().map(|choice| choice.message.clone()).collect();
            (estimated_prompt_tokens, u64::from(token_counter::estimate_completion_tokens(&messages)))
        } else {
            (u64::from(response.usage.prompt_tokens), u64::from(response.usage.completion_tokens))
        };

        LocalSpan::add_property(|| ("gen_ai.usage.input_tokens", input_tokens.to_string()));
        LocalSpan::add_property(|| ("gen_ai.usage.output_tokens", output_tokens.to_string()));

        self.recorder.record(usage::UsageRecord {
            timestamp: Timestamp::now(),
            rule_id,
            provider_id: selection.provider_id,
            model: selection.model.clone(),
            input_tokens,
            output_tokens,
            estimated,
            latency_ms: start.elapsed().as_millis() as u64,
            status_code: 200,
            streamed,
            error_kind: None,
        });
    }

    fn record_failure(&self, rule_id: Uuid, provider_id: Uuid, model: &str, start: Instant, streamed: bool, error: &PipelineError) {
        LocalSpan::add_property(|| ("error", "true"));
        LocalSpan::add_property(|| ("error.type", error.error_kind_for_record()));

        self.recorder.record(usage::UsageRecord {
            timestamp: Timestamp::now(),
            rule_id,
            provider_id,
            model: model.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            estimated: false,
            latency_ms: start.elapsed().as_millis() as u64,
            status_code: error.status_code_for_record(),
            streamed,
            error_kind: Some(error.error_kind_for_record()),
        });
    }
}

/// Fabricates a response for `virtual_model_token` dry-run routing: no upstream is
/// ever called, so the reply just echoes the routed model name back with empty content.
fn synthesize_dry_run_response(request: &UnifiedRequest, selection: &Selection) -> UnifiedResponse {
    use crate::messages::unified::{
        UnifiedChoice, UnifiedContentContainer, UnifiedFinishReason, UnifiedMessage, UnifiedRole, UnifiedUsage,
    };

    let _ = request;

    UnifiedResponse {
        id: provider::new_id("dry-run"),
        model: selection.model.clone(),
        choices: vec![UnifiedChoice {
            index: 0,
            message: UnifiedMessage {
                role: UnifiedRole::Assistant,
                content: UnifiedContentContainer::Text(String::new()),
                tool_calls: None,
                tool_call_id: None,
            },
            finish_reason: Some(UnifiedFinishReason::Stop),
        }],
        usage: UnifiedUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        },
        created: provider::now(),
        stop_reason: None,
        stop_sequence: None,
    }
}

/// Wraps an upstream [`ChatCompletionStream`] to record a usage row the moment the
/// stream is dropped — on natural completion, on an upstream error, or on the client
/// disconnecting mid-stream, which are the only three ways this can end.
#[pin_project(PinnedDrop)]
struct InstrumentedStream {
    #[pin]
    inner: ChatCompletionStream,
    recorder: usage::Recorder,
    balancer: Arc<LoadBalancer<SqliteRotationStore>>,
    rule: config::Rule,
    selection: Selection,
    provider_id: Uuid,
    model: String,
    response_model: Option<String>,
    start: Instant,
    input_tokens: u64,
    output_chars: usize,
    output_tokens_from_usage: Option<u64>,
    finished: bool,
    errored: bool,
}

impl Stream for InstrumentedStream {
    type Item = Result<UnifiedChunk, PipelineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(mut chunk))) => {
                if let Some(usage) = &chunk.usage {
                    *this.input_tokens = u64::from(usage.prompt_tokens);
                    *this.output_tokens_from_usage = Some(u64::from(usage.completion_tokens));
                }

                for choice in &chunk.choices {
                    if let Some(content) = &choice.delta.content {
                        *this.output_chars += content.len();
                    }
                }

                if let Some(name) = this.response_model.as_ref() {
                    chunk.model = name.clone().into();
                }

                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                *this.errored = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                *this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[pinned_drop]
impl PinnedDrop for InstrumentedStream {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();

        let (status_code, error_kind) = if *this.finished {
            (200, None)
        } else if *this.errored {
            (502, Some("upstream_error".to_string()))
        } else {
            (499, Some("client_disconnected".to_string()))
        };

        let estimated = this.output_tokens_from_usage.is_none();
        let output_tokens =
            (*this.output_tokens_from_usage).unwrap_or_else(|| u64::from(token_counter::estimate_tokens_for_chars(*this.output_chars)));

        if let Err(e) = this.balancer.record_outcome(this.rule, this.selection, output_tokens, *this.finished) {
            log::error!("failed to record load balancer outcome: {e}");
        }

        this.recorder.record(usage::UsageRecord {
            timestamp: Timestamp::now(),
            rule_id: this.rule.id,
            provider_id: *this.provider_id,
            model: this.model.clone(),
            input_tokens: *this.input_tokens,
            output_tokens,
            estimated,
            latency_ms: this.start.elapsed().as_millis() as u64,
            status_code,
            streamed: true,
            error_kind,
        });
    }
}

/// Races a dispatch future against the request's cancellation token, so a client that
/// disconnects while the upstream is still thinking gets `ClientDisconnected` instead
/// of an eventually-discarded response.
async fn select_on_cancellation<T>(
    context: &RequestContext,
    dispatch: impl std::future::Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        result = dispatch => result,
        () = context.cancellation.cancelled() => Err(PipelineError::ClientDisconnected),
    }
}

fn map_routing_error(error: routing::error::RoutingError, request_model: &str) -> PipelineError {
    match error {
        routing::error::RoutingError::NoActiveServices(_) => PipelineError::UnknownModel(request_model.to_string()),
        other => PipelineError::InternalInvariant(other.to_string()),
    }
}

impl PipelineError {
    fn status_code_for_record(&self) -> u16 {
        match self {
            Self::UpstreamTimeout => 504,
            Self::UpstreamStatus { status, .. } => status.as_u16(),
            Self::CredentialUnavailable(_) => 502,
            Self::ClientDisconnected => 499,
            _ => 502,
        }
    }

    fn error_kind_for_record(&self) -> String {
        self.to_string()
    }
}
