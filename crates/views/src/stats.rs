//! Shared aggregation building block for the leaderboard and scorecard
//! views (spec.md §4.G): both are "group run-items by car and average the
//! metrics/assertions/judge scores", just scoped to a different set of runs.

use std::collections::HashMap;

use serde::Serialize;
use store::{CarId, Metric, RunItem, RunItemId, RunItemStatus};

/// Per-car aggregate row shared by the leaderboard (all runs) and the
/// scorecard (one run).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CarScorecard {
    pub car_id: CarId,
    pub items_total: u64,
    pub items_failed: u64,
    pub items_partial: u64,
    pub avg_ttft_ms: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub avg_tokens_per_sec: Option<f64>,
    pub error_rate: f64,
    pub avg_assertion_pass_rate: Option<f64>,
    pub avg_judge_overall: Option<f64>,
}

#[derive(Default)]
struct Accumulator {
    items_total: u64,
    items_failed: u64,
    items_partial: u64,
    ttft_sum: f64,
    ttft_count: u64,
    latency_sum: f64,
    latency_count: u64,
    tps_sum: f64,
    tps_count: u64,
    error_count: u64,
    assertions_passed: f64,
    assertions_total: f64,
    judge_sum: f64,
    judge_count: u64,
}

/// Builds one [`CarScorecard`] per car referenced in `run_items`.
///
/// `assertion_totals` maps a run-item to `(passed, total)` pulled from its
/// stored assertion summary; `judge_overalls_by_car` maps a car to every
/// per-car judge aggregate `overall` value observed for it (one per run
/// where a judge pass ran), averaged arithmetically here too.
pub fn build_car_scorecards(
    run_items: &[RunItem],
    metrics: &[Metric],
    assertion_totals: &HashMap<RunItemId, (u64, u64)>,
    judge_overalls_by_car: &HashMap<CarId, Vec<f64>>,
) -> Vec<CarScorecard> {
    let metrics_by_item: HashMap<RunItemId, &Metric> = metrics.iter().map(|m| (m.run_item_id, m)).collect();
    let mut accumulators: HashMap<CarId, Accumulator> = HashMap::new();

    for item in run_items {
        let accumulator = accumulators.entry(item.car_id).or_default();
        accumulator.items_total += 1;
        match item.status {
            RunItemStatus::Failed => accumulator.items_failed += 1,
            RunItemStatus::PartialToolSupport => accumulator.items_partial += 1,
            _ => {}
        }

        if let Some(metric) = metrics_by_item.get(&item.id) {
            if metric.error_flag {
                accumulator.error_count += 1;
            }
            if let Some(ttft) = metric.ttft_ms {
                accumulator.ttft_sum += ttft as f64;
                accumulator.ttft_count += 1;
            }
            if let Some(latency) = metric.total_latency_ms {
                accumulator.latency_sum += latency as f64;
                accumulator.latency_count += 1;
            }
            if let Some(tps) = metric.tokens_per_sec {
                accumulator.tps_sum += tps;
                accumulator.tps_count += 1;
            }
        }

        if let Some((passed, total)) = assertion_totals.get(&item.id)
            && *total > 0
        {
            accumulator.assertions_passed += *passed as f64;
            accumulator.assertions_total += *total as f64;
        }
    }

    for (car_id, overalls) in judge_overalls_by_car {
        if overalls.is_empty() {
            continue;
        }
        let accumulator = accumulators.entry(*car_id).or_default();
        accumulator.judge_sum += overalls.iter().sum::<f64>();
        accumulator.judge_count += overalls.len() as u64;
    }

    accumulators
        .into_iter()
        .map(|(car_id, accumulator)| CarScorecard {
            car_id,
            items_total: accumulator.items_total,
            items_failed: accumulator.items_failed,
            items_partial: accumulator.items_partial,
            avg_ttft_ms: (accumulator.ttft_count > 0).then(|| accumulator.ttft_sum / accumulator.ttft_count as f64),
            avg_latency_ms: (accumulator.latency_count > 0)
                .then(|| accumulator.latency_sum / accumulator.latency_count as f64),
            avg_tokens_per_sec: (accumulator.tps_count > 0).then(|| accumulator.tps_sum / accumulator.tps_count as f64),
            error_rate: if accumulator.items_total > 0 {
                accumulator.error_count as f64 / accumulator.items_total as f64
            } else {
                0.0
            },
            avg_assertion_pass_rate: (accumulator.assertions_total > 0.0)
                .then(|| accumulator.assertions_passed / accumulator.assertions_total),
            avg_judge_overall: (accumulator.judge_count > 0).then(|| accumulator.judge_sum / accumulator.judge_count as f64),
        })
        .collect()
}

/// Sorts descending by `(avg_judge_overall, avg_assertion_pass_rate, -error_rate)`,
/// treating absent values as -1 (spec.md §4.G).
pub fn sort_leaderboard(rows: &mut [CarScorecard]) {
    rows.sort_by(|a, b| {
        let key = |row: &CarScorecard| {
            (
                row.avg_judge_overall.unwrap_or(-1.0),
                row.avg_assertion_pass_rate.unwrap_or(-1.0),
                -row.error_rate,
            )
        };
        key(b).partial_cmp(&key(a)).unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{CarId, RunId, RunItemId, SuiteId, TestId};

    fn item(car_id: CarId, status: RunItemStatus) -> RunItem {
        RunItem {
            id: RunItemId(car_id.0),
            run_id: RunId(1),
            test_id: TestId(1),
            car_id,
            status,
            attempt_count: 1,
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }

    fn metric(run_item_id: RunItemId, error_flag: bool) -> Metric {
        Metric {
            run_item_id,
            ttft_ms: Some(100),
            total_latency_ms: Some(1000),
            generation_ms: Some(900),
            output_tokens: 10,
            output_tokens_estimated: false,
            tokens_per_sec: Some(11.0),
            error_flag,
        }
    }

    #[test]
    fn aggregates_per_car() {
        let car = CarId(1);
        let run_items = vec![item(car, RunItemStatus::Completed), item(CarId(2), RunItemStatus::Failed)];
        let metrics = vec![metric(RunItemId(1), false), metric(RunItemId(2), true)];
        let rows = build_car_scorecards(&run_items, &metrics, &HashMap::new(), &HashMap::new());
        assert_eq!(rows.len(), 2);
        let car1 = rows.iter().find(|r| r.car_id == car).unwrap();
        assert_eq!(car1.items_total, 1);
        assert_eq!(car1.error_rate, 0.0);
        let car2 = rows.iter().find(|r| r.car_id == CarId(2)).unwrap();
        assert_eq!(car2.items_failed, 1);
        assert_eq!(car2.error_rate, 1.0);
    }

    #[test]
    fn scorecard_shape_for_a_single_completed_car() {
        let run_items = vec![item(CarId(1), RunItemStatus::Completed)];
        let metrics = vec![metric(RunItemId(1), false)];
        let mut assertion_totals = HashMap::new();
        assertion_totals.insert(RunItemId(1), (2u64, 2u64));
        let mut judge_overalls_by_car = HashMap::new();
        judge_overalls_by_car.insert(CarId(1), vec![8.0]);

        let rows = build_car_scorecards(&run_items, &metrics, &assertion_totals, &judge_overalls_by_car);
        insta::assert_json_snapshot!(rows, @r###"
        [
          {
            "car_id": 1,
            "items_total": 1,
            "items_failed": 0,
            "items_partial": 0,
            "avg_ttft_ms": 100.0,
            "avg_latency_ms": 1000.0,
            "avg_tokens_per_sec": 11.0,
            "error_rate": 0.0,
            "avg_assertion_pass_rate": 1.0,
            "avg_judge_overall": 8.0
          }
        ]
        "###);
    }

    #[test]
    fn sorts_nulls_last() {
        let mut rows = vec![
            CarScorecard {
                car_id: CarId(1),
                items_total: 1,
                items_failed: 0,
                items_partial: 0,
                avg_ttft_ms: None,
                avg_latency_ms: None,
                avg_tokens_per_sec: None,
                error_rate: 0.0,
                avg_assertion_pass_rate: None,
                avg_judge_overall: None,
            },
            CarScorecard {
                car_id: CarId(2),
                items_total: 1,
                items_failed: 0,
                items_partial: 0,
                avg_ttft_ms: None,
                avg_latency_ms: None,
                avg_tokens_per_sec: None,
                error_rate: 0.0,
                avg_assertion_pass_rate: None,
                avg_judge_overall: Some(9.0),
            },
        ];
        sort_leaderboard(&mut rows);
        assert_eq!(rows[0].car_id, CarId(2));
    }
}
