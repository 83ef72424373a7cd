use serde::Deserialize;

use super::exporters::ExportersConfig;

/// Metrics-specific telemetry configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Exporters override for metrics; falls back to the global exporters when unset.
    exporters: Option<ExportersConfig>,
}

impl MetricsConfig {
    /// Exporters configured specifically for metrics, if any.
    pub fn exporters(&self) -> Option<&ExportersConfig> {
        self.exporters.as_ref()
    }
}
