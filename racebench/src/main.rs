use std::sync::Arc;
use std::time::Duration;

use args::Args;
use clap::Parser;
use config::{Config, StoreBackend};
use provider::{OpenRouterAttribution, PassthroughSecretSource};
use race::RaceExecutor;
use store::memory::MemoryStore;
use store::Store;
use tokio_util::sync::CancellationToken;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    server::logger::init(&args.log_filter);

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let _tracing_guard = config.telemetry.tracing_enabled.then(telemetry::init_tracing);

    log::info!("racebench starting up");

    let store: Arc<dyn Store> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let secrets = Arc::new(PassthroughSecretSource);
    let attribution = OpenRouterAttribution::default();
    let executor = RaceExecutor::new(
        store.clone(),
        secrets.clone(),
        attribution.clone(),
        config.race.tool_loop_limit,
    );

    let shutdown_signal = CancellationToken::new();
    let shutdown_handle = shutdown_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_handle.cancel();
        }
    });

    let serve_config = server::ServeConfig {
        listen_address: config.server.listen_address,
        store,
        executor,
        secrets,
        attribution,
        discovery_timeout: Duration::from_secs(30),
        judge_timeout: Duration::from_secs(60),
        subscriber_poll_interval: Duration::from_millis(config.race.subscriber_poll_interval_ms),
        subscriber_heartbeat_after: Duration::from_secs(config.race.subscriber_heartbeat_seconds),
        shutdown_signal,
        bound_addr_sender: None,
    };

    server::serve(serve_config).await?;

    fastrace::flush();

    Ok(())
}
