//! Per-request context threaded through every stage of the request pipeline.

mod client_identity;

use config::{AuthMode, Scenario};
use fastrace::collector::SpanContext;
use tokio_util::sync::CancellationToken;

pub use client_identity::ClientIdentity;

/// Carries the state accumulated as a single inbound request moves through
/// authentication, rule resolution, load balancing, translation, dispatch and
/// recording. Each pipeline stage is a pure function over this context except where
/// the stage itself mutates shared state (balancer counters, vault credentials).
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Whether this request dispatches to the upstream or short-circuits.
    pub auth_mode: AuthMode,
    /// Which ingress scenario this request was received under.
    pub scenario: Scenario,
    /// Best-effort client identity, used only to attribute usage records.
    pub client_identity: Option<ClientIdentity>,
    /// Cancelled when the client disconnects or the server begins a graceful shutdown.
    /// A per-request child of the listener's root token.
    pub cancellation: CancellationToken,
    /// Parent span for distributed tracing propagation, if the ingress request carried one.
    pub span_context: Option<SpanContext>,
}

impl RequestContext {
    /// Construct a context for a freshly-accepted request.
    pub fn new(auth_mode: AuthMode, scenario: Scenario, parent_cancellation: &CancellationToken) -> Self {
        Self {
            auth_mode,
            scenario,
            client_identity: None,
            cancellation: parent_cancellation.child_token(),
            span_context: None,
        }
    }

    /// Attach a client identity derived from request headers/IP.
    pub fn with_client_identity(mut self, client_identity: Option<ClientIdentity>) -> Self {
        self.client_identity = client_identity;
        self
    }

    /// Attach an inbound distributed-tracing span context.
    pub fn with_span_context(mut self, span_context: Option<SpanContext>) -> Self {
        self.span_context = span_context;
        self
    }

    /// True when this request should short-circuit before upstream dispatch ( step 1,
    /// Open Question #2: `virtual_model_token` → dry-run routing).
    pub fn is_dry_run(&self) -> bool {
        self.auth_mode == AuthMode::DryRun
    }

    /// Create a tracing span rooted in this request's parent context, or a fresh root
    /// span if none was propagated from the ingress request.
    pub fn new_span(&self, name: &'static str) -> fastrace::Span {
        match self.span_context {
            Some(parent) => fastrace::Span::root(name, parent),
            None => fastrace::Span::root(name, SpanContext::random()),
        }
    }
}
