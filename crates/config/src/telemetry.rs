//! Telemetry configuration for observability (ambient stack, §2 of
//! `SPEC_FULL.md`). This repo has no external collaborator to ship spans
//! to, so the only knob is whether in-process tracing is enabled at all;
//! logging is always on.

use serde::Deserialize;

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name attached to log lines and span records.
    pub service_name: String,
    /// Whether `fastrace` spans are collected at all.
    pub tracing_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "modelrace".to_string(),
            tracing_enabled: true,
        }
    }
}
