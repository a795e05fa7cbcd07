//! Shared application state injected into every handler.

use std::sync::Arc;
use std::time::Duration;

use provider::{OpenRouterAttribution, SecretSource};
use race::RaceExecutor;
use store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub executor: Arc<RaceExecutor>,
    pub secrets: Arc<dyn SecretSource>,
    pub attribution: OpenRouterAttribution,
    pub discovery_timeout: Duration,
    pub judge_timeout: Duration,
    pub subscriber_poll_interval: Duration,
    pub subscriber_heartbeat_after: Duration,
}

pub type SharedState = Arc<AppState>;
