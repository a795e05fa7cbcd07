//! Single-run scorecard: the same per-car aggregation as the leaderboard,
//! scoped to one run (spec.md §4.G).

use std::collections::HashMap;

use store::{CarId, RunId, Store, StoreResult};

use crate::assertions::assertion_totals_for_items;
use crate::stats::{build_car_scorecards, sort_leaderboard, CarScorecard};

pub async fn scorecard(store: &dyn Store, run_id: RunId) -> StoreResult<Vec<CarScorecard>> {
    let run_items = store.list_run_items_by_run(run_id).await?;
    let metrics = store.list_metrics_by_run(run_id).await?;
    let assertion_totals = assertion_totals_for_items(store, &run_items).await?;

    let mut judge_overalls_by_car: HashMap<CarId, Vec<f64>> = HashMap::new();
    for row in store.list_judge_results_by_run(run_id).await? {
        if let Some(car_id) = row.car_id
            && row.run_item_id.is_none()
        {
            judge_overalls_by_car.entry(car_id).or_default().push(row.overall);
        }
    }

    let mut rows = build_car_scorecards(&run_items, &metrics, &assertion_totals, &judge_overalls_by_car);
    sort_leaderboard(&mut rows);
    Ok(rows)
}
