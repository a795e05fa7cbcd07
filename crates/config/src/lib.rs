//! Process-level configuration for the `racebench` binary.
//!
//! The entity data model (Connection, Car, Suite, ...) is persisted
//! through `store::Store`, not configured here. This crate only covers
//! what a deployable binary needs before it can construct that store and
//! start serving: listen address, store backend selection, race-executor
//! tuning, secret source, and the ambient telemetry knobs.

#![deny(missing_docs)]

mod error;
mod loader;
mod race;
mod secrets;
mod server;
mod store;
mod telemetry;

use std::path::Path;

pub use error::Error;
pub use race::RaceConfig;
pub use secrets::SecretsConfig;
pub use server::ServerConfig;
pub use store::{StoreBackend, StoreConfig};
pub use telemetry::TelemetryConfig;

use serde::Deserialize;

/// Root configuration structure for the `racebench` binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Persistence backend configuration.
    pub store: StoreConfig,
    /// Race executor tuning.
    pub race: RaceConfig,
    /// Secret source configuration.
    pub secrets: SecretsConfig,
    /// Telemetry configuration.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        loader::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_parse_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen_address.port(), 8090);
        assert_eq!(config.race.tool_loop_limit, 3);
        assert_eq!(config.secrets.secret_key_env_var, "MODELRACE_SECRET_KEY");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<Config>("unknown_top_level = true").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
