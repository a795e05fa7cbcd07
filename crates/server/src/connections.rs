//! `/api/connections` CRUD plus model discovery and connection diagnostics
//! (spec.md §6).

use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use store::{Connection, ConnectionId, ConnectionType};

use crate::error::ApiResult;
use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/connections", get(list).post(create))
        .route(
            "/api/connections/{id}",
            get(get_one).put(update).delete(delete_one),
        )
        .route("/api/connections/{id}/models", get(models))
        .route("/api/connections/{id}/test", post(test))
        .route("/api/connections/{id}/verify-runtime", post(verify_runtime))
}

#[derive(Debug, Deserialize)]
struct ConnectionRequest {
    name: String,
    r#type: ConnectionType,
    base_url: String,
    api_key: Option<String>,
    api_key_env_var: Option<String>,
}

async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<Connection>>> {
    Ok(Json(state.store.list_connections().await?))
}

async fn create(
    State(state): State<SharedState>,
    Json(body): Json<ConnectionRequest>,
) -> ApiResult<Json<Connection>> {
    let connection = Connection {
        id: ConnectionId(0),
        name: body.name,
        r#type: body.r#type,
        base_url: body.base_url,
        api_key_encrypted: body.api_key.map(SecretString::from),
        api_key_env_var: body.api_key_env_var,
    };
    Ok(Json(state.store.create_connection(connection).await?))
}

async fn get_one(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<Json<Connection>> {
    Ok(Json(state.store.get_connection(ConnectionId(id)).await?))
}

async fn update(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(body): Json<ConnectionRequest>,
) -> ApiResult<Json<Connection>> {
    let connection = Connection {
        id: ConnectionId(id),
        name: body.name,
        r#type: body.r#type,
        base_url: body.base_url,
        api_key_encrypted: body.api_key.map(SecretString::from),
        api_key_env_var: body.api_key_env_var,
    };
    state.store.update_connection(connection.clone()).await?;
    Ok(Json(connection))
}

async fn delete_one(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<()> {
    state.store.delete_connection(ConnectionId(id)).await?;
    Ok(())
}

async fn models(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<Json<Vec<String>>> {
    let connection = state.store.get_connection(ConnectionId(id)).await?;
    let (api_key, source) = provider::resolve_api_key(&connection, state.secrets.as_ref());
    let models = provider::discover_models(&connection, api_key.as_deref(), source, state.discovery_timeout).await?;
    Ok(Json(models))
}

#[derive(Debug, Serialize)]
struct TestConnectionResponse {
    ok: bool,
    latency_ms: u64,
    models: Vec<String>,
    error: Option<String>,
}

async fn test(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult<Json<TestConnectionResponse>> {
    let connection = state.store.get_connection(ConnectionId(id)).await?;
    let (api_key, source) = provider::resolve_api_key(&connection, state.secrets.as_ref());
    let outcome = provider::test_connection(&connection, api_key.as_deref(), source, state.discovery_timeout).await;
    Ok(Json(TestConnectionResponse {
        ok: outcome.ok,
        latency_ms: outcome.latency_ms,
        models: outcome.models,
        error: outcome.error,
    }))
}

#[derive(Debug, Serialize)]
struct VerifyRuntimeResponse {
    ok: bool,
    auth_source: &'static str,
    latency_ms: u64,
    error: Option<String>,
}

/// Resolves the auth source and re-attempts discovery, surfacing the
/// diagnostic hints `ProviderError`'s formatter embeds in its message
/// (spec.md §7) alongside which credential source was used.
async fn verify_runtime(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<VerifyRuntimeResponse>> {
    let connection = state.store.get_connection(ConnectionId(id)).await?;
    let (api_key, source) = provider::resolve_api_key(&connection, state.secrets.as_ref());
    let auth_source = match source {
        provider::ApiKeySource::EncryptedDb => "encrypted_db",
        provider::ApiKeySource::EnvVar => "env_var",
        provider::ApiKeySource::None => "none",
    };
    let timeout = Duration::from_secs(10).min(state.discovery_timeout);
    let outcome = provider::test_connection(&connection, api_key.as_deref(), source, timeout).await;
    Ok(Json(VerifyRuntimeResponse {
        ok: outcome.ok,
        auth_source,
        latency_ms: outcome.latency_ms,
        error: outcome.error,
    }))
}
