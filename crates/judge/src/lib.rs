//! Judge pipeline (spec.md §4.F): re-invokes a designated car over every
//! run-item output, parses a strict-JSON rubric, and aggregates scores
//! per-item, per-car, and per-run.

mod aggregate;
mod error;
mod rubric;

pub use error::JudgeError;
pub use rubric::{RubricScores, RUBRIC_SYSTEM_PROMPT};

use std::time::Duration;

use futures::StreamExt;
use provider::{GenerateEvent, NormalizedMessage, NormalizedRequest, OpenRouterAttribution, SecretSource};
use serde_json::{json, Value};
use store::{CarId, JudgeResult, RunId, Store};

const JUDGE_TEMPERATURE: f64 = 0.0;
const JUDGE_TOP_P: f64 = 1.0;
const JUDGE_MAX_TOKENS: u32 = 300;

/// Counts produced by one judge pass, returned to the HTTP handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgeSummary {
    pub item_scores: usize,
    pub car_aggregates: usize,
}

async fn drain_text(
    mut stream: futures::stream::BoxStream<'static, GenerateEvent>,
) -> Result<(String, Value), JudgeError> {
    let mut text = String::new();
    let mut raw = json!({});
    while let Some(event) = stream.next().await {
        match event {
            GenerateEvent::Token(token) => text.push_str(&token),
            GenerateEvent::Telemetry { .. } => {}
            GenerateEvent::Done(response) => {
                if text.is_empty() {
                    text = response.text.clone();
                }
                raw = response.raw.clone();
            }
        }
    }
    Ok((text, raw))
}

fn zero_score_result(run_id: RunId, run_item_id: store::RunItemId) -> JudgeResult {
    JudgeResult {
        run_id,
        run_item_id: Some(run_item_id),
        car_id: None,
        writing_score: 0.0,
        coding_score: 0.0,
        tool_score: 0.0,
        overall: 0.0,
        rationale: "Judge JSON parse failed".to_string(),
        raw: Value::Null,
    }
}

/// Runs the judge pipeline for `run_id`, resolving the judge car from
/// `judge_car_id_override` or the run's stored `judge_car_id`.
pub async fn judge(
    store: &dyn Store,
    secrets: &dyn SecretSource,
    attribution: &OpenRouterAttribution,
    run_id: RunId,
    judge_car_id_override: Option<CarId>,
    timeout: Duration,
) -> Result<JudgeSummary, JudgeError> {
    let run = store.get_run(run_id).await?;
    let judge_car_id = judge_car_id_override.or(run.judge_car_id).ok_or(JudgeError::NoJudgeConfigured)?;
    let judge_car = store.get_car(judge_car_id).await?;
    let connection = store.get_connection(judge_car.connection_id).await?;

    eventlog::emit(store, run_id, None, "judge.started", json!({ "judge_car_id": judge_car_id.0 })).await?;

    store.delete_judge_results_by_run(run_id).await?;

    let run_items = store.list_run_items_by_run(run_id).await?;
    let mut item_scores: Vec<(CarId, JudgeResult)> = Vec::new();

    for item in &run_items {
        let Ok(output) = store.get_output(item.id).await else {
            continue;
        };
        let Ok(test) = store.get_test(item.test_id).await else {
            continue;
        };

        let output_text = output.final_text.clone().or(output.streamed_text.clone()).unwrap_or_default();

        let messages = vec![
            NormalizedMessage::system(RUBRIC_SYSTEM_PROMPT),
            NormalizedMessage::user(rubric::build_user_prompt(&test, &output_text)),
        ];
        let mut request = NormalizedRequest::new(judge_car.model_name.clone(), messages);
        request.temperature = Some(JUDGE_TEMPERATURE);
        request.top_p = Some(JUDGE_TOP_P);
        request.max_tokens = Some(JUDGE_MAX_TOKENS);

        let result = match provider::generate(&connection, secrets, attribution, &request, timeout).await {
            Ok(stream) => {
                let (text, _raw) = drain_text(stream).await?;
                let mut parsed_raw = Value::Null;
                match rubric::parse_rubric_response(&text, &mut parsed_raw) {
                    Some(scores) => JudgeResult {
                        run_id,
                        run_item_id: Some(item.id),
                        car_id: None,
                        writing_score: scores.writing_score,
                        coding_score: scores.coding_score,
                        tool_score: scores.tool_score,
                        overall: scores.overall,
                        rationale: scores.rationale,
                        raw: parsed_raw,
                    },
                    None => zero_score_result(run_id, item.id),
                }
            }
            Err(err) => {
                log::warn!("judge call failed for run_item {}: {err}", item.id);
                zero_score_result(run_id, item.id)
            }
        };

        store.insert_judge_result(result.clone()).await?;
        item_scores.push((item.car_id, result));
    }

    let aggregates = aggregate::aggregate(run_id, &item_scores);
    let car_aggregates = aggregates.len().saturating_sub(1);
    for row in &aggregates {
        store.insert_judge_result(row.clone()).await?;
    }

    eventlog::emit(
        store,
        run_id,
        None,
        "judge.completed",
        json!({ "item_scores": item_scores.len(), "car_aggregates": car_aggregates }),
    )
    .await?;

    Ok(JudgeSummary {
        item_scores: item_scores.len(),
        car_aggregates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_score_result_has_fixed_rationale() {
        let result = zero_score_result(RunId(1), store::RunItemId(1));
        assert_eq!(result.overall, 0.0);
        assert_eq!(result.rationale, "Judge JSON parse failed");
    }
}
