//! Configuration for the secret source backing `Connection::api_key_encrypted`.
//!
//! The encryption-at-rest algorithm is an external collaborator (spec.md
//! §1); this repo only needs to know which environment variable holds the
//! key material used to decrypt it, modeled behind `provider::SecretSource`.

use serde::Deserialize;

/// Secret-handling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Environment variable holding the key used to decrypt
    /// `Connection::api_key_encrypted` values.
    pub secret_key_env_var: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            secret_key_env_var: "MODELRACE_SECRET_KEY".to_string(),
        }
    }
}
