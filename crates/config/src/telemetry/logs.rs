use serde::Deserialize;

use super::exporters::ExportersConfig;

/// Logs-specific telemetry configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LogsConfig {
    /// Exporters override for logs; falls back to the global exporters when unset.
    exporters: Option<ExportersConfig>,
}

impl LogsConfig {
    /// Exporters configured specifically for logs, if any.
    pub fn exporters(&self) -> Option<&ExportersConfig> {
        self.exporters.as_ref()
    }
}
