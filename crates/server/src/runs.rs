//! `/api/runs` start/snapshot/scorecard/compare/judge (spec.md §6).

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use store::{CarId, Metric, Output, Run, RunId, RunItem, RunStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/runs/start", post(start))
        .route("/api/runs/{id}", get(snapshot))
        .route("/api/runs/{id}/scorecard", get(scorecard))
        .route("/api/runs/{id}/compare", get(compare))
        .route("/api/runs/{id}/judge", post(run_judge))
}

#[derive(Debug, Deserialize)]
struct StartRunRequest {
    suite_id: u64,
    car_ids: Vec<u64>,
    judge_car_id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StartRunResponse {
    run_id: u64,
}

async fn start(State(state): State<SharedState>, Json(body): Json<StartRunRequest>) -> ApiResult<Json<StartRunResponse>> {
    if body.car_ids.is_empty() {
        return Err(ApiError::Validation("car_ids must not be empty".to_string()));
    }
    let suite_id = store::SuiteId(body.suite_id);
    let selected_car_ids: Vec<CarId> = body.car_ids.iter().copied().map(CarId).collect();

    let run = state
        .store
        .create_run(Run {
            id: RunId(0),
            suite_id,
            status: RunStatus::Queued,
            started_at: None,
            finished_at: None,
            selected_car_ids: selected_car_ids.clone(),
            judge_car_id: body.judge_car_id.map(CarId),
        })
        .await?;

    let tests = state.store.list_tests_by_suite(suite_id).await?;
    for test in &tests {
        for car_id in &selected_car_ids {
            state
                .store
                .create_run_item(RunItem {
                    id: store::RunItemId(0),
                    run_id: run.id,
                    test_id: test.id,
                    car_id: *car_id,
                    status: store::RunItemStatus::Pending,
                    attempt_count: 0,
                    started_at: None,
                    finished_at: None,
                    error_message: None,
                })
                .await?;
        }
    }

    state.executor.enqueue(run.id);
    Ok(Json(StartRunResponse { run_id: run.id.0 }))
}

#[derive(Debug, Serialize)]
struct RunItemSnapshot {
    item: RunItem,
    output: Option<Output>,
    metric: Option<Metric>,
}

#[derive(Debug, Serialize)]
struct RunSnapshot {
    run: Run,
    items: Vec<RunItemSnapshot>,
}

async fn snapshot(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<Json<RunSnapshot>> {
    let run_id = RunId(id);
    let run = state.store.get_run(run_id).await?;
    let items = state.store.list_run_items_by_run(run_id).await?;

    let mut snapshots = Vec::with_capacity(items.len());
    for item in items {
        let output = state.store.get_output(item.id).await.ok();
        let metric = state.store.get_metric(item.id).await.ok();
        snapshots.push(RunItemSnapshot { item, output, metric });
    }

    Ok(Json(RunSnapshot { run, items: snapshots }))
}

async fn scorecard(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<Json<Vec<views::CarScorecard>>> {
    Ok(Json(views::scorecard(state.store.as_ref(), RunId(id)).await?))
}

#[derive(Debug, Deserialize)]
struct CompareQuery {
    baseline_run_id: u64,
}

async fn compare(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<Json<Vec<views::Comparison>>> {
    let comparisons = views::compare(state.store.as_ref(), RunId(id), RunId(query.baseline_run_id)).await?;
    Ok(Json(comparisons))
}

#[derive(Debug, Deserialize, Default)]
struct JudgeRequest {
    judge_car_id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct JudgeResponse {
    item_scores: usize,
    car_aggregates: usize,
}

async fn run_judge(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    body: Option<Json<JudgeRequest>>,
) -> ApiResult<Json<JudgeResponse>> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let summary = judge::judge(
        state.store.as_ref(),
        state.secrets.as_ref(),
        &state.attribution,
        RunId(id),
        body.judge_car_id.map(CarId),
        state.judge_timeout,
    )
    .await?;
    Ok(Json(JudgeResponse {
        item_scores: summary.item_scores,
        car_aggregates: summary.car_aggregates,
    }))
}
