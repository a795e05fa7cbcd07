//! API key resolution and per-protocol header composition (spec.md §4.A).

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use secrecy::ExposeSecret;
use store::{Connection, ConnectionType};

use crate::error::ApiKeySource;

/// Decrypts a connection's `api_key_encrypted` column.
///
/// The encryption-at-rest scheme itself is an external collaborator
/// (spec.md §1); this trait is the seam a real implementation plugs into.
/// [`PassthroughSecretSource`] is the reference implementation used by
/// tests and the in-process store: it treats the stored value as already
/// holding plaintext, which is sufficient for a library that never writes
/// encrypted values of its own.
pub trait SecretSource: Send + Sync {
    /// Decrypts `ciphertext`, returning the plaintext API key.
    fn decrypt(&self, ciphertext: &secrecy::SecretString) -> anyhow::Result<String>;
}

/// Reference [`SecretSource`]: the stored secret already holds plaintext.
pub struct PassthroughSecretSource;

impl SecretSource for PassthroughSecretSource {
    fn decrypt(&self, ciphertext: &secrecy::SecretString) -> anyhow::Result<String> {
        Ok(ciphertext.expose_secret().to_string())
    }
}

/// Resolves the API key for a connection, trying, in order: the encrypted
/// column, the named environment variable, then none.
pub fn resolve_api_key(connection: &Connection, secrets: &dyn SecretSource) -> (Option<String>, ApiKeySource) {
    if let Some(encrypted) = &connection.api_key_encrypted {
        match secrets.decrypt(encrypted) {
            Ok(key) => return (Some(key), ApiKeySource::EncryptedDb),
            Err(err) => log::warn!("failed to decrypt API key for connection {}: {err}", connection.name),
        }
    }

    if let Some(var) = &connection.api_key_env_var
        && let Ok(key) = std::env::var(var)
    {
        return (Some(key), ApiKeySource::EnvVar);
    }

    (None, ApiKeySource::None)
}

/// Optional OpenRouter attribution headers, set only when configured.
#[derive(Debug, Clone, Default)]
pub struct OpenRouterAttribution {
    pub referer: Option<String>,
    pub title: Option<String>,
}

/// Builds the request headers for a connection per spec.md §4.A.
pub fn build_headers(
    connection: &Connection,
    api_key: Option<&str>,
    attribution: &OpenRouterAttribution,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if connection.r#type == ConnectionType::Anthropic {
        if let Some(key) = api_key
            && let Ok(value) = HeaderValue::from_str(key)
        {
            headers.insert(HeaderName::from_static("x-api-key"), value);
        }
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static("2023-06-01"),
        );
        return headers;
    }

    if let Some(key) = api_key
        && let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}"))
    {
        headers.insert(AUTHORIZATION, value.clone());

        if matches!(
            connection.r#type,
            ConnectionType::OpenaiCompat | ConnectionType::LlamacppOpenai | ConnectionType::Custom
        ) {
            headers.insert(HeaderName::from_static("x-api-key"), value.clone());
            headers.insert(HeaderName::from_static("api-key"), value);
        }
    }

    if connection.r#type == ConnectionType::Openrouter {
        if let Some(referer) = &attribution.referer
            && let Ok(value) = HeaderValue::from_str(referer)
        {
            headers.insert(HeaderName::from_static("http-referer"), value);
        }
        if let Some(title) = &attribution.title
            && let Ok(value) = HeaderValue::from_str(title)
        {
            headers.insert(HeaderName::from_static("x-title"), value);
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::ConnectionId;

    fn connection(r#type: ConnectionType) -> Connection {
        Connection {
            id: ConnectionId(1),
            name: "test".into(),
            r#type,
            base_url: "http://localhost:11434".into(),
            api_key_encrypted: None,
            api_key_env_var: None,
        }
    }

    #[test]
    fn anthropic_sets_x_api_key_and_version() {
        let headers = build_headers(&connection(ConnectionType::Anthropic), Some("sk-test"), &Default::default());
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-test");
        assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn openai_compat_duplicates_bearer_into_legacy_headers() {
        let headers = build_headers(&connection(ConnectionType::OpenaiCompat), Some("sk-test"), &Default::default());
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert_eq!(headers.get("x-api-key").unwrap(), "Bearer sk-test");
        assert_eq!(headers.get("api-key").unwrap(), "Bearer sk-test");
    }

    #[test]
    fn plain_openai_only_sets_bearer() {
        let headers = build_headers(&connection(ConnectionType::Openai), Some("sk-test"), &Default::default());
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert!(!headers.contains_key("x-api-key"));
    }

    #[test]
    fn env_var_resolution_takes_over_when_no_encrypted_key() {
        // SAFETY: test-local env var, not read concurrently elsewhere.
        unsafe { std::env::set_var("PROVIDER_TEST_KEY", "from-env") };
        let mut conn = connection(ConnectionType::Openai);
        conn.api_key_env_var = Some("PROVIDER_TEST_KEY".into());
        let (key, source) = resolve_api_key(&conn, &PassthroughSecretSource);
        assert_eq!(key.as_deref(), Some("from-env"));
        assert_eq!(source, ApiKeySource::EnvVar);
        unsafe { std::env::remove_var("PROVIDER_TEST_KEY") };
    }
}
