//! `/api/settings/providers` (spec.md §6, §3's `ProviderSettings`).

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use store::ProviderSettings;

use crate::error::ApiResult;
use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/settings/providers", get(list))
        .route("/api/settings/providers/{provider_type}", get(get_one).put(upsert))
}

async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<ProviderSettings>>> {
    Ok(Json(state.store.list_provider_settings().await?))
}

async fn get_one(
    State(state): State<SharedState>,
    Path(provider_type): Path<String>,
) -> ApiResult<Json<ProviderSettings>> {
    Ok(Json(state.store.get_provider_settings(&provider_type).await?))
}

async fn upsert(
    State(state): State<SharedState>,
    Path(provider_type): Path<String>,
    Json(mut body): Json<ProviderSettings>,
) -> ApiResult<Json<ProviderSettings>> {
    body.provider_type = provider_type;
    state.store.upsert_provider_settings(body.clone()).await?;
    Ok(Json(body))
}
