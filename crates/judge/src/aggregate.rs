//! Per-car and per-run aggregation of judge scores (spec.md §4.F step 6).

use std::collections::HashMap;

use store::{CarId, JudgeResult, RunId};

struct Accumulator {
    writing: f64,
    coding: f64,
    tool: f64,
    overall: f64,
    count: usize,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            writing: 0.0,
            coding: 0.0,
            tool: 0.0,
            overall: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, item: &JudgeResult) {
        self.writing += item.writing_score;
        self.coding += item.coding_score;
        self.tool += item.tool_score;
        self.overall += item.overall;
        self.count += 1;
    }

    fn finish(&self, run_id: RunId, run_item_id: Option<store::RunItemId>, car_id: Option<CarId>) -> JudgeResult {
        let n = self.count.max(1) as f64;
        JudgeResult {
            run_id,
            run_item_id,
            car_id,
            writing_score: self.writing / n,
            coding_score: self.coding / n,
            tool_score: self.tool / n,
            overall: self.overall / n,
            rationale: format!("arithmetic mean over {} item(s)", self.count),
            raw: serde_json::Value::Null,
        }
    }
}

/// Builds one per-car aggregate row per car present in `item_scores`, plus
/// one overall per-run aggregate row. Both means are arithmetic, per
/// spec.md §8.
pub fn aggregate(run_id: RunId, item_scores: &[(CarId, JudgeResult)]) -> Vec<JudgeResult> {
    let mut per_car: HashMap<CarId, Accumulator> = HashMap::new();
    let mut overall = Accumulator::new();

    for (car_id, result) in item_scores {
        per_car.entry(*car_id).or_insert_with(Accumulator::new).add(result);
        overall.add(result);
    }

    let mut rows: Vec<JudgeResult> = per_car
        .into_iter()
        .map(|(car_id, acc)| acc.finish(run_id, None, Some(car_id)))
        .collect();
    rows.sort_by_key(|row| row.car_id.map(|id| id.0));
    rows.push(overall.finish(run_id, None, None));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::RunItemId;

    fn result(run_id: RunId, run_item_id: RunItemId, overall: f64) -> JudgeResult {
        JudgeResult {
            run_id,
            run_item_id: Some(run_item_id),
            car_id: None,
            writing_score: overall,
            coding_score: overall,
            tool_score: overall,
            overall,
            rationale: "t".into(),
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn aggregates_per_car_and_overall() {
        let run_id = RunId(1);
        let car_a = CarId(1);
        let car_b = CarId(2);
        let items = vec![
            (car_a, result(run_id, RunItemId(1), 8.0)),
            (car_a, result(run_id, RunItemId(2), 6.0)),
            (car_b, result(run_id, RunItemId(3), 4.0)),
        ];
        let rows = aggregate(run_id, &items);
        assert_eq!(rows.len(), 3);
        let run_row = rows.iter().find(|r| r.car_id.is_none()).unwrap();
        assert!((run_row.overall - 6.0).abs() < 1e-9);
        let car_a_row = rows.iter().find(|r| r.car_id == Some(car_a)).unwrap();
        assert!((car_a_row.overall - 7.0).abs() < 1e-9);
    }
}
