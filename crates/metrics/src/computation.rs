//! Timing and throughput computation for a terminal run-item attempt.

#[derive(Debug, Clone, PartialEq)]
pub struct MetricComputation {
    pub ttft_ms: Option<i64>,
    pub total_latency_ms: i64,
    pub generation_ms: Option<i64>,
    pub output_tokens: u32,
    pub output_tokens_estimated: bool,
    pub tokens_per_sec: Option<f64>,
}

/// Whitespace-word-count proxy for providers that report no token usage.
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    ((words as f64) * 1.25).floor().max(1.0) as u32
}

pub fn compute_metrics(
    started_ms: i64,
    finished_ms: i64,
    ttft_ms: Option<i64>,
    output_text: &str,
    usage_completion_tokens: Option<u32>,
    usage_estimated: bool,
) -> MetricComputation {
    let total_latency_ms = (finished_ms - started_ms).max(0);
    let generation_ms = ttft_ms.map(|ttft| (total_latency_ms - ttft).max(1));

    let (output_tokens, output_tokens_estimated) = match usage_completion_tokens {
        Some(tokens) => (tokens.max(1), usage_estimated),
        None => (estimate_tokens(output_text), true),
    };

    let tokens_per_sec = generation_ms.filter(|ms| *ms > 0).map(|ms| output_tokens as f64 / (ms as f64 / 1000.0));

    MetricComputation {
        ttft_ms,
        total_latency_ms,
        generation_ms,
        output_tokens,
        output_tokens_estimated,
        tokens_per_sec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_generation_time_and_estimated_tokens() {
        let metrics = compute_metrics(100, 1200, Some(200), "hello world from llm", None, false);
        assert_eq!(metrics.total_latency_ms, 1100);
        assert_eq!(metrics.generation_ms, Some(900));
        assert!(metrics.output_tokens > 0);
        assert!(metrics.output_tokens_estimated);
        let expected_tps = metrics.output_tokens as f64 / 0.9;
        assert!((metrics.tokens_per_sec.unwrap() - expected_tps).abs() < 1e-9);
    }

    #[test]
    fn authoritative_usage_overrides_estimate() {
        let metrics = compute_metrics(0, 1000, Some(100), "x", Some(42), false);
        assert_eq!(metrics.output_tokens, 42);
        assert!(!metrics.output_tokens_estimated);
    }

    #[test]
    fn missing_ttft_yields_no_generation_time() {
        let metrics = compute_metrics(0, 1000, None, "some words here", None, false);
        assert!(metrics.generation_ms.is_none());
        assert!(metrics.tokens_per_sec.is_none());
    }
}
