//! Run-to-run comparison (spec.md §4.G): pairs cars present in both runs,
//! computes signed deltas, and classifies with a five-threshold score.

use std::collections::HashMap;

use serde::Serialize;
use store::{CarId, RunId, Store, StoreResult};

use crate::scorecard::scorecard;
use crate::stats::CarScorecard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Improved,
    Regressed,
    Mixed,
    NewProfileInCurrentRun,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comparison {
    pub car_id: CarId,
    pub verdict: Verdict,
    pub latency_delta_ms: Option<f64>,
    pub tps_delta: Option<f64>,
    pub error_rate_delta: f64,
    pub assertion_pass_rate_delta: Option<f64>,
    pub judge_overall_delta: Option<f64>,
}

fn classify(current: &CarScorecard, baseline: &CarScorecard) -> Comparison {
    let latency_delta_ms = current
        .avg_latency_ms
        .zip(baseline.avg_latency_ms)
        .map(|(c, b)| c - b);
    let tps_delta = current.avg_tokens_per_sec.zip(baseline.avg_tokens_per_sec).map(|(c, b)| c - b);
    let error_rate_delta = current.error_rate - baseline.error_rate;
    let assertion_pass_rate_delta = current
        .avg_assertion_pass_rate
        .zip(baseline.avg_assertion_pass_rate)
        .map(|(c, b)| c - b);
    let judge_overall_delta = current.avg_judge_overall.zip(baseline.avg_judge_overall).map(|(c, b)| c - b);

    let mut score = 0i32;
    if let Some(delta) = latency_delta_ms {
        score += if delta <= -50.0 {
            1
        } else if delta >= 50.0 {
            -1
        } else {
            0
        };
    }
    if let Some(delta) = tps_delta {
        score += if delta >= 0.5 {
            1
        } else if delta <= -0.5 {
            -1
        } else {
            0
        };
    }
    score += if error_rate_delta <= -0.05 {
        1
    } else if error_rate_delta >= 0.05 {
        -1
    } else {
        0
    };
    if let Some(delta) = assertion_pass_rate_delta {
        score += if delta >= 0.05 {
            1
        } else if delta <= -0.05 {
            -1
        } else {
            0
        };
    }
    if let Some(delta) = judge_overall_delta {
        score += if delta >= 0.3 {
            1
        } else if delta <= -0.3 {
            -1
        } else {
            0
        };
    }

    let verdict = if score >= 2 {
        Verdict::Improved
    } else if score <= -2 {
        Verdict::Regressed
    } else {
        Verdict::Mixed
    };

    Comparison {
        car_id: current.car_id,
        verdict,
        latency_delta_ms,
        tps_delta,
        error_rate_delta,
        assertion_pass_rate_delta,
        judge_overall_delta,
    }
}

pub async fn compare(store: &dyn Store, current_run_id: RunId, baseline_run_id: RunId) -> StoreResult<Vec<Comparison>> {
    let current_rows = scorecard(store, current_run_id).await?;
    let baseline_rows = scorecard(store, baseline_run_id).await?;
    let baseline_by_car: HashMap<CarId, &CarScorecard> = baseline_rows.iter().map(|row| (row.car_id, row)).collect();

    let mut comparisons = Vec::with_capacity(current_rows.len());
    for current in &current_rows {
        let comparison = match baseline_by_car.get(&current.car_id) {
            Some(baseline) => classify(current, baseline),
            None => Comparison {
                car_id: current.car_id,
                verdict: Verdict::NewProfileInCurrentRun,
                latency_delta_ms: None,
                tps_delta: None,
                error_rate_delta: 0.0,
                assertion_pass_rate_delta: None,
                judge_overall_delta: None,
            },
        };
        comparisons.push(comparison);
    }
    Ok(comparisons)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(car_id: CarId, latency: f64, tps: f64, error_rate: f64, assertions: f64, judge: f64) -> CarScorecard {
        CarScorecard {
            car_id,
            items_total: 1,
            items_failed: 0,
            items_partial: 0,
            avg_ttft_ms: None,
            avg_latency_ms: Some(latency),
            avg_tokens_per_sec: Some(tps),
            error_rate,
            avg_assertion_pass_rate: Some(assertions),
            avg_judge_overall: Some(judge),
        }
    }

    #[test]
    fn classifies_improved_on_strong_gains() {
        let baseline = row(CarId(1), 1000.0, 10.0, 0.2, 0.5, 5.0);
        let current = row(CarId(1), 900.0, 10.6, 0.1, 0.6, 5.4);
        let comparison = classify(&current, &baseline);
        assert_eq!(comparison.verdict, Verdict::Improved);
    }

    #[test]
    fn classifies_regressed_on_strong_losses() {
        let baseline = row(CarId(1), 900.0, 10.6, 0.1, 0.6, 5.4);
        let current = row(CarId(1), 1000.0, 10.0, 0.2, 0.5, 5.0);
        let comparison = classify(&current, &baseline);
        assert_eq!(comparison.verdict, Verdict::Regressed);
    }

    #[test]
    fn classifies_mixed_on_small_changes() {
        let baseline = row(CarId(1), 1000.0, 10.0, 0.1, 0.5, 5.0);
        let current = row(CarId(1), 1005.0, 10.01, 0.1, 0.5, 5.0);
        let comparison = classify(&current, &baseline);
        assert_eq!(comparison.verdict, Verdict::Mixed);
    }
}
