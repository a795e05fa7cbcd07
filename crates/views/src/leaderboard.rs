//! Global leaderboard: per-car aggregates across every run (spec.md §4.G).

use std::collections::HashMap;

use store::{CarId, Store, StoreResult};

use crate::assertions::assertion_totals_for_items;
use crate::stats::{build_car_scorecards, sort_leaderboard, CarScorecard};

/// Aggregates every car's performance across all runs ever executed,
/// sorted descending by `(avg_judge_overall, avg_assertion_pass_rate, -error_rate)`.
pub async fn leaderboard(store: &dyn Store) -> StoreResult<Vec<CarScorecard>> {
    let runs = store.list_runs().await?;

    let mut all_items = Vec::new();
    let mut all_metrics = Vec::new();
    let mut assertion_totals = HashMap::new();
    let mut judge_overalls_by_car: HashMap<CarId, Vec<f64>> = HashMap::new();

    for run in &runs {
        let items = store.list_run_items_by_run(run.id).await?;
        let metrics = store.list_metrics_by_run(run.id).await?;
        assertion_totals.extend(assertion_totals_for_items(store, &items).await?);

        for row in store.list_judge_results_by_run(run.id).await? {
            if let Some(car_id) = row.car_id
                && row.run_item_id.is_none()
            {
                judge_overalls_by_car.entry(car_id).or_default().push(row.overall);
            }
        }

        all_items.extend(items);
        all_metrics.extend(metrics);
    }

    let mut rows = build_car_scorecards(&all_items, &all_metrics, &assertion_totals, &judge_overalls_by_car);
    sort_leaderboard(&mut rows);
    Ok(rows)
}
