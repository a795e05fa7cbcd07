//! `/api/leaderboard` (spec.md §6, §4.G).

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::ApiResult;
use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/leaderboard", get(leaderboard))
}

async fn leaderboard(State(state): State<SharedState>) -> ApiResult<Json<Vec<views::CarScorecard>>> {
    Ok(Json(views::leaderboard(state.store.as_ref()).await?))
}
