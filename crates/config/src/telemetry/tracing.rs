use serde::Deserialize;

use super::exporters::ExportersConfig;

/// Per-signal span collection limits, matching the OpenTelemetry SDK defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectConfig {
    /// Maximum events recorded per span.
    pub max_events_per_span: u32,
    /// Maximum attributes recorded per span.
    pub max_attributes_per_span: u32,
    /// Maximum links recorded per span.
    pub max_links_per_span: u32,
    /// Maximum attributes recorded per event.
    pub max_attributes_per_event: u32,
    /// Maximum attributes recorded per link.
    pub max_attributes_per_link: u32,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_events_per_span: 128,
            max_attributes_per_span: 128,
            max_links_per_span: 128,
            max_attributes_per_event: 128,
            max_attributes_per_link: 128,
        }
    }
}

/// Which distributed-tracing propagation formats to honor on ingress and emit on egress.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PropagationConfig {
    /// W3C `traceparent`/`tracestate` headers.
    pub trace_context: bool,
    /// AWS X-Ray `X-Amzn-Trace-Id` header.
    pub aws_xray: bool,
}

/// Tracing-specific telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingConfig {
    /// Fraction of requests sampled, in `[0.0, 1.0]`.
    pub sampling: f64,
    /// Whether to respect the parent span's sampling decision when present.
    pub parent_based_sampler: bool,
    /// Per-span collection limits.
    pub collect: CollectConfig,
    /// Context propagation formats.
    pub propagation: PropagationConfig,
    /// Exporters override for traces; falls back to the global exporters when unset.
    pub exporters: Option<ExportersConfig>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            sampling: 0.15,
            parent_based_sampler: false,
            collect: CollectConfig::default(),
            propagation: PropagationConfig::default(),
            exporters: None,
        }
    }
}

impl TracingConfig {
    /// Exporters configured specifically for traces, if any.
    pub fn exporters(&self) -> Option<&ExportersConfig> {
        self.exporters.as_ref()
    }
}
