use std::path::Path;

use serde::Deserialize;

use crate::{Config, Error};

/// Reads a TOML file from `path` and deserializes it into a [`Config`],
/// layering onto field defaults for anything the file omits.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let config = Config::deserialize(toml::Deserializer::new(&content))?;
    Ok(config)
}
