//! In-process distributed tracing via `fastrace`.
//!
//! The race executor opens one root span per run and one child span per
//! run-item (see `race::executor`); this module only owns process-wide
//! setup and teardown. There is no external collaborator to export spans
//! to in this repo, so the reporter logs completed spans through the `log`
//! facade instead of shipping them over OTLP — a future exporter can be
//! bolted on here without touching the span call sites.

use fastrace::collector::{Config as CollectorConfig, Reporter};
use fastrace::prelude::SpanRecord;

/// Guard that flushes any buffered spans when dropped.
pub struct TracingGuard;

impl TracingGuard {
    /// Force flush all pending spans immediately. Useful in tests.
    pub fn force_flush(&self) {
        fastrace::flush();
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        fastrace::flush();
    }
}

/// A [`Reporter`] that renders finished spans as `log::debug!` lines.
struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, spans: Vec<SpanRecord>) {
        for span in spans {
            log::debug!(
                "span {name} ({duration_us}us) trace_id={trace_id} span_id={span_id}",
                name = span.name,
                duration_us = span.duration_ns / 1_000,
                trace_id = span.trace_id.0,
                span_id = span.span_id.0,
            );
        }
    }
}

/// Installs the process-wide fastrace reporter. Call once at startup.
pub fn init_tracing() -> TracingGuard {
    fastrace::set_reporter(LogReporter, CollectorConfig::default());
    TracingGuard
}
