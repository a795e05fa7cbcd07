//! Shared `reqwest` client construction.
//!
//! Connection-specific headers are applied per-request (see
//! [`crate::headers::build_headers`]), so the shared client only carries
//! pool and timeout tuning.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;

static CLIENT: OnceLock<Client> = OnceLock::new();

fn build() -> Client {
    Client::builder()
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .build()
        .expect("reqwest client configuration is valid")
}

/// Returns the process-wide HTTP client, building it on first use.
pub fn client() -> Client {
    CLIENT.get_or_init(build).clone()
}
