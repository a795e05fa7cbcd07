//! Errors raised while loading and validating process configuration.

/// Failure modes for [`crate::Config::load`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration file could not be opened.
    #[error("Failed to open configuration file: {0}")]
    ConfigOpen(#[from] std::io::Error),
    /// The configuration file's contents are not valid TOML or do not match
    /// the expected shape.
    #[error("Failed to parse configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
