//! `/api/cars` CRUD (spec.md §6).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use store::{Car, CarId, ConnectionId};

use crate::error::ApiResult;
use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/cars", get(list).post(create))
        .route("/api/cars/{id}", get(get_one).put(update).delete(delete_one))
}

#[derive(Debug, Deserialize)]
struct CarRequest {
    name: String,
    connection_id: u64,
    model_name: String,
    temperature: Option<f64>,
    top_p: Option<f64>,
    max_tokens: Option<u32>,
    stop: Option<Vec<String>>,
    seed: Option<i64>,
}

async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<Car>>> {
    Ok(Json(state.store.list_cars().await?))
}

async fn create(State(state): State<SharedState>, Json(body): Json<CarRequest>) -> ApiResult<Json<Car>> {
    let car = Car {
        id: CarId(0),
        name: body.name,
        connection_id: ConnectionId(body.connection_id),
        model_name: body.model_name,
        temperature: body.temperature,
        top_p: body.top_p,
        max_tokens: body.max_tokens,
        stop: body.stop,
        seed: body.seed,
    };
    Ok(Json(state.store.create_car(car).await?))
}

async fn get_one(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<Json<Car>> {
    Ok(Json(state.store.get_car(CarId(id)).await?))
}

async fn update(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(body): Json<CarRequest>,
) -> ApiResult<Json<Car>> {
    let car = Car {
        id: CarId(id),
        name: body.name,
        connection_id: ConnectionId(body.connection_id),
        model_name: body.model_name,
        temperature: body.temperature,
        top_p: body.top_p,
        max_tokens: body.max_tokens,
        stop: body.stop,
        seed: body.seed,
    };
    state.store.update_car(car.clone()).await?;
    Ok(Json(car))
}

async fn delete_one(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<()> {
    state.store.delete_car(CarId(id)).await?;
    Ok(())
}
