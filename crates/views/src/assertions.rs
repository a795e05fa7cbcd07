//! Recovers the `(passed, total)` assertion counts the race executor
//! stashed into `Output.raw_provider_payload["assertions"]` (see
//! `race::executor::execute_item_attempt` step 6).

use std::collections::HashMap;

use store::{RunItem, RunItemId, Store, StoreResult};

pub async fn assertion_totals_for_items(
    store: &dyn Store,
    run_items: &[RunItem],
) -> StoreResult<HashMap<RunItemId, (u64, u64)>> {
    let mut totals = HashMap::new();
    for item in run_items {
        let Ok(output) = store.get_output(item.id).await else {
            continue;
        };
        let Some(raw) = &output.raw_provider_payload else {
            continue;
        };
        let Some(assertions) = raw.get("assertions") else {
            continue;
        };
        let passed = assertions.get("passed").and_then(|v| v.as_u64());
        let total = assertions.get("total").and_then(|v| v.as_u64());
        if let (Some(passed), Some(total)) = (passed, total) {
            totals.insert(item.id, (passed, total));
        }
    }
    Ok(totals)
}
