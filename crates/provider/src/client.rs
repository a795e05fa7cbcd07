//! Provider client entry points: model discovery, connection testing, and
//! streaming generation (spec.md §4.A).

use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use serde::Deserialize;
use store::{Connection, ConnectionType, ProviderMode};

use crate::error::{truncate_body, ApiKeySource, ProviderError};
use crate::headers::{build_headers, OpenRouterAttribution, SecretSource};
use crate::http_client;
use crate::protocol::{anthropic, ollama, openai_compat};
use crate::types::{GenerateEvent, NormalizedRequest, TestConnectionOutcome};

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelListEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelListEntry {
    id: String,
}

fn models_url(connection: &Connection) -> String {
    let base = connection.base_url.trim_end_matches('/');
    match connection.r#type {
        ConnectionType::Ollama => format!("{base}/api/tags"),
        ConnectionType::Openrouter => format!("{base}/api/v1/models"),
        _ => format!("{base}/v1/models"),
    }
}

/// Lists the model ids a connection's endpoint currently serves.
///
/// `source` identifies where `api_key` came from (or that there wasn't
/// one), so a 401 response can hint at the right remedy.
pub async fn discover_models(
    connection: &Connection,
    api_key: Option<&str>,
    source: ApiKeySource,
    timeout: Duration,
) -> Result<Vec<String>, ProviderError> {
    let client = http_client::client();
    let headers = build_headers(connection, api_key, &OpenRouterAttribution::default());
    let url = models_url(connection);

    let response = client
        .get(&url)
        .headers(headers)
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| ProviderError::Connection {
            action: "discover_models",
            provider: connection.name.clone(),
            base_url: connection.base_url.clone(),
            source: err.to_string(),
            hint: crate::error::connection_hint(&connection.base_url, err.is_connect()),
        })?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        let hint = crate::error::http_error_hint(status.as_u16(), &body, source);
        return Err(ProviderError::Http {
            action: "discover_models",
            provider: connection.name.clone(),
            base_url: connection.base_url.clone(),
            status: status.as_u16(),
            body: truncate_body(&body),
            hint,
        });
    }

    if connection.r#type == ConnectionType::Ollama {
        let parsed: OllamaTags = serde_json::from_str(&body).map_err(|err| ProviderError::Parse {
            action: "discover_models",
            provider: connection.name.clone(),
            base_url: connection.base_url.clone(),
            message: err.to_string(),
        })?;
        Ok(parsed.models.into_iter().map(|model| model.name).collect())
    } else {
        let parsed: ModelList = serde_json::from_str(&body).map_err(|err| ProviderError::Parse {
            action: "discover_models",
            provider: connection.name.clone(),
            base_url: connection.base_url.clone(),
            message: err.to_string(),
        })?;
        Ok(parsed.data.into_iter().map(|entry| entry.id).collect())
    }
}

/// Exercises [`discover_models`], measuring wall-clock latency.
pub async fn test_connection(
    connection: &Connection,
    api_key: Option<&str>,
    source: ApiKeySource,
    timeout: Duration,
) -> TestConnectionOutcome {
    let started = Instant::now();
    match discover_models(connection, api_key, source, timeout).await {
        Ok(models) => TestConnectionOutcome {
            ok: true,
            latency_ms: started.elapsed().as_millis() as u64,
            models,
            error: None,
        },
        Err(err) => TestConnectionOutcome {
            ok: false,
            latency_ms: started.elapsed().as_millis() as u64,
            models: Vec::new(),
            error: Some(err.to_string()),
        },
    }
}

/// Resolves headers and dispatches to the protocol adapter matching
/// `connection.r#type.provider_mode()`, returning the normalized event
/// stream the race executor drives.
pub async fn generate(
    connection: &Connection,
    secrets: &dyn SecretSource,
    attribution: &OpenRouterAttribution,
    request: &NormalizedRequest,
    timeout: Duration,
) -> Result<BoxStream<'static, GenerateEvent>, ProviderError> {
    let (api_key, source) = crate::headers::resolve_api_key(connection, secrets);
    let headers = build_headers(connection, api_key.as_deref(), attribution);

    match connection.r#type.provider_mode() {
        ProviderMode::Ollama => ollama::generate(connection, headers, request, source, timeout).await,
        ProviderMode::Anthropic => anthropic::generate(connection, headers, request, source, timeout).await,
        ProviderMode::OpenaiCompat => openai_compat::generate(connection, headers, request, source, timeout).await,
    }
}
