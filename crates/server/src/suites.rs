//! `/api/suites` CRUD, with nested test management (spec.md §6).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use store::{Suite, SuiteId, Test, TestId};

use crate::error::ApiResult;
use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/suites", get(list).post(create))
        .route("/api/suites/{id}", get(get_one).put(update).delete(delete_one))
        .route("/api/suites/{id}/tests", get(list_tests).post(create_test))
        .route(
            "/api/suites/{suite_id}/tests/{test_id}",
            get(get_test).put(update_test).delete(delete_test),
        )
}

#[derive(Debug, Deserialize)]
struct SuiteRequest {
    name: String,
    category: String,
    #[serde(default)]
    is_demo: bool,
}

async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<Suite>>> {
    Ok(Json(state.store.list_suites().await?))
}

async fn create(State(state): State<SharedState>, Json(body): Json<SuiteRequest>) -> ApiResult<Json<Suite>> {
    let suite = Suite {
        id: SuiteId(0),
        name: body.name,
        category: body.category,
        is_demo: body.is_demo,
    };
    Ok(Json(state.store.create_suite(suite).await?))
}

async fn get_one(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<Json<Suite>> {
    Ok(Json(state.store.get_suite(SuiteId(id)).await?))
}

async fn update(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(body): Json<SuiteRequest>,
) -> ApiResult<Json<Suite>> {
    let suite = Suite {
        id: SuiteId(id),
        name: body.name,
        category: body.category,
        is_demo: body.is_demo,
    };
    state.store.update_suite(suite.clone()).await?;
    Ok(Json(suite))
}

async fn delete_one(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<()> {
    state.store.delete_suite(SuiteId(id)).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TestRequest {
    order_index: i32,
    name: String,
    system_prompt: Option<String>,
    user_prompt: String,
    expected_constraints: Option<String>,
    tools_schema: Option<Value>,
}

async fn list_tests(State(state): State<SharedState>, Path(suite_id): Path<u64>) -> ApiResult<Json<Vec<Test>>> {
    Ok(Json(state.store.list_tests_by_suite(SuiteId(suite_id)).await?))
}

async fn create_test(
    State(state): State<SharedState>,
    Path(suite_id): Path<u64>,
    Json(body): Json<TestRequest>,
) -> ApiResult<Json<Test>> {
    let test = Test {
        id: TestId(0),
        suite_id: SuiteId(suite_id),
        order_index: body.order_index,
        name: body.name,
        system_prompt: body.system_prompt,
        user_prompt: body.user_prompt,
        expected_constraints: body.expected_constraints,
        tools_schema: body.tools_schema,
    };
    Ok(Json(state.store.create_test(test).await?))
}

async fn get_test(
    State(state): State<SharedState>,
    Path((_suite_id, test_id)): Path<(u64, u64)>,
) -> ApiResult<Json<Test>> {
    Ok(Json(state.store.get_test(TestId(test_id)).await?))
}

async fn update_test(
    State(state): State<SharedState>,
    Path((suite_id, test_id)): Path<(u64, u64)>,
    Json(body): Json<TestRequest>,
) -> ApiResult<Json<Test>> {
    let test = Test {
        id: TestId(test_id),
        suite_id: SuiteId(suite_id),
        order_index: body.order_index,
        name: body.name,
        system_prompt: body.system_prompt,
        user_prompt: body.user_prompt,
        expected_constraints: body.expected_constraints,
        tools_schema: body.tools_schema,
    };
    state.store.update_test(test.clone()).await?;
    Ok(Json(test))
}

async fn delete_test(
    State(state): State<SharedState>,
    Path((_suite_id, test_id)): Path<(u64, u64)>,
) -> ApiResult<()> {
    state.store.delete_test(TestId(test_id)).await?;
    Ok(())
}
