//! Race executor tuning: tool-loop budget and telemetry subscriber pacing.

use serde::Deserialize;

/// Config knobs for the race executor and its telemetry subscriber stream
/// (spec.md §4.E, §4.D).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaceConfig {
    /// Maximum number of tool-use round-trips per run-item attempt before
    /// the item is marked `PARTIAL_TOOL_SUPPORT`.
    pub tool_loop_limit: u32,
    /// Telemetry subscriber poll interval, in milliseconds.
    pub subscriber_poll_interval_ms: u64,
    /// Seconds of subscriber idle time before a heartbeat comment is sent.
    pub subscriber_heartbeat_seconds: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            tool_loop_limit: 3,
            subscriber_poll_interval_ms: 400,
            subscriber_heartbeat_seconds: 10,
        }
    }
}
