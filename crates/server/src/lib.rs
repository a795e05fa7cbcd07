//! modelrace server library.
//!
//! Provides a reusable `serve` function that wires `store`, `race`,
//! `judge`, and `views` into the HTTP surface spec.md §6 describes, for
//! use by the `racebench` binary or integration tests.

mod cars;
mod connections;
mod error;
mod health;
mod leaderboard;
pub mod logger;
mod runs;
mod settings;
mod state;
mod stream;
mod suites;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::Router;
use provider::{OpenRouterAttribution, SecretSource};
use race::RaceExecutor;
use store::Store;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Configuration for serving the modelrace HTTP surface.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// Persistence backend serving every entity in spec.md §3.
    pub store: Arc<dyn Store>,
    /// Race executor; `serve` starts its worker task and stops it on
    /// shutdown.
    pub executor: Arc<RaceExecutor>,
    /// Decrypts `Connection::api_key_encrypted` values.
    pub secrets: Arc<dyn SecretSource>,
    /// Optional OpenRouter attribution headers.
    pub attribution: OpenRouterAttribution,
    /// Per-call timeout for model discovery / connection-test requests.
    pub discovery_timeout: Duration,
    /// Per-call timeout for judge rubric requests.
    pub judge_timeout: Duration,
    /// Telemetry subscriber poll interval (spec.md §4.D).
    pub subscriber_poll_interval: Duration,
    /// Telemetry subscriber idle time before a heartbeat comment is sent.
    pub subscriber_heartbeat_after: Duration,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Optional oneshot sender to report back the bound address (useful
    /// when port 0 was requested).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts the race executor's worker task, builds the router, and serves
/// it until `shutdown_signal` is cancelled.
pub async fn serve(
    ServeConfig {
        listen_address,
        store,
        executor,
        secrets,
        attribution,
        discovery_timeout,
        judge_timeout,
        subscriber_poll_interval,
        subscriber_heartbeat_after,
        shutdown_signal,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    executor.start().await;

    let app_state = Arc::new(AppState {
        store,
        executor: executor.clone(),
        secrets,
        attribution,
        discovery_timeout,
        judge_timeout,
        subscriber_poll_interval,
        subscriber_heartbeat_after,
    });

    let app: Router = Router::new()
        .merge(health::router())
        .merge(connections::router())
        .merge(cars::router())
        .merge(suites::router())
        .merge(settings::router())
        .merge(runs::router())
        .merge(stream::router())
        .merge(leaderboard::router())
        .with_state(app_state);

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|err| anyhow!("failed to bind to {listen_address}: {err}"))?;

    if let Some(sender) = bound_addr_sender {
        sender
            .send(listener.local_addr()?)
            .expect("failed to send back bound address");
    }

    log::info!("modelrace listening on http://{listen_address}");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.map_err(|err| anyhow!("HTTP server failed: {err}"))?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("shutdown signal received, stopping gracefully");
        }
    }

    executor.stop().await;
    Ok(())
}
