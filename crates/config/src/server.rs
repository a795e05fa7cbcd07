//! HTTP server configuration settings.

use std::net::SocketAddr;

use serde::Deserialize;

/// Where the HTTP surface (§6) binds and which paths it answers health
/// checks on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: SocketAddr,
    /// Path the health endpoint answers on.
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8090".parse().expect("valid default address"),
            health_path: "/api/health".to_string(),
        }
    }
}
