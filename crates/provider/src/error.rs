//! Provider client errors, including the diagnostic-hint formatter spec.md
//! §7 describes. Hints are appended, never substituted, so the underlying
//! error text is always preserved.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{action} failed for {provider} endpoint {base_url}: {source}{hint}")]
    Connection {
        action: &'static str,
        provider: String,
        base_url: String,
        source: String,
        hint: String,
    },

    #[error("{action} failed for {provider} endpoint {base_url}: HTTP {status}: {body}{hint}")]
    Http {
        action: &'static str,
        provider: String,
        base_url: String,
        status: u16,
        body: String,
        hint: String,
    },

    #[error("{action} failed for {provider} endpoint {base_url}: {message}")]
    Parse {
        action: &'static str,
        provider: String,
        base_url: String,
        message: String,
    },
}

const MAX_BODY_CHARS: usize = 500;

pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
        format!("{truncated}…")
    }
}

/// Suggests `host.docker.internal` when the base URL points at a loopback
/// address, since this engine typically runs inside a container.
pub fn docker_localhost_hint(base_url: &str) -> Option<String> {
    let host = Url::parse(base_url).ok()?.host_str()?.to_string();
    matches!(host.as_str(), "localhost" | "127.0.0.1" | "0.0.0.0").then(|| {
        " Tip: this engine may run in a container. For host-local services, use http://host.docker.internal:<port>."
            .to_string()
    })
}

/// Suggests falling back off `host.docker.internal` on Windows hosts when
/// the connection is actively refused there.
pub fn windows_host_hint(base_url: &str, connection_refused: bool) -> Option<String> {
    let host = Url::parse(base_url).ok()?.host_str()?.to_string();
    (host == "host.docker.internal" && connection_refused).then(|| {
        " Tip: host.docker.internal resolution varies across Docker Desktop versions on Windows; verify the daemon exposes this alias or bind to the host's LAN IP instead.".to_string()
    })
}

/// Jan (and similarly strict local servers) rejects requests whose `Host`
/// header isn't in its allowlist; a 403 with this body text is diagnostic.
pub fn jan_trusted_host_hint(status: u16, body: &str) -> Option<String> {
    (status == 403 && body.to_lowercase().contains("invalid host header")).then(|| {
        " Tip: this server validates the Host header against a trusted-host allowlist (seen with Jan); configure it to accept this engine's hostname.".to_string()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    EncryptedDb,
    EnvVar,
    None,
}

/// Combines the docker-localhost and Windows-host hints for a failed
/// connection attempt; at most one can match a given base URL.
pub fn connection_hint(base_url: &str, connection_refused: bool) -> String {
    docker_localhost_hint(base_url)
        .or_else(|| windows_host_hint(base_url, connection_refused))
        .unwrap_or_default()
}

/// Combines the Jan trusted-host and API-key hints for a non-2xx response.
pub fn http_error_hint(status: u16, body: &str, source: ApiKeySource) -> String {
    jan_trusted_host_hint(status, body)
        .or_else(|| api_key_hint(status, source))
        .unwrap_or_default()
}

/// Guidance varies by where the (missing or rejected) key came from.
pub fn api_key_hint(status: u16, source: ApiKeySource) -> Option<String> {
    if status != 401 {
        return None;
    }
    let tip = match source {
        ApiKeySource::EncryptedDb => {
            "the stored encrypted API key was rejected; re-enter it on the connection"
        }
        ApiKeySource::EnvVar => {
            "the API key environment variable was rejected or unset; check it on the host running this engine"
        }
        ApiKeySource::None => "no API key is configured for this connection; add one or set its environment variable",
    };
    Some(format!(" Tip: {tip}."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_hint_prefers_docker_localhost_over_windows_host() {
        assert!(connection_hint("http://localhost:11434", true).contains("host.docker.internal"));
        assert!(connection_hint("http://host.docker.internal:11434", true).contains("Docker Desktop"));
        assert_eq!(connection_hint("https://api.openai.com", true), "");
    }

    #[test]
    fn windows_host_hint_requires_refusal() {
        assert!(windows_host_hint("http://host.docker.internal:11434", false).is_none());
        assert!(windows_host_hint("http://host.docker.internal:11434", true).is_some());
    }

    #[test]
    fn http_error_hint_prefers_jan_trusted_host_over_api_key_source() {
        let jan_body = "invalid host header";
        let hint = http_error_hint(403, jan_body, ApiKeySource::EnvVar);
        assert!(hint.contains("trusted-host allowlist"));

        let hint = http_error_hint(401, "unauthorized", ApiKeySource::EncryptedDb);
        assert!(hint.contains("stored encrypted API key"));

        let hint = http_error_hint(401, "unauthorized", ApiKeySource::None);
        assert!(hint.contains("no API key is configured"));

        assert_eq!(http_error_hint(500, "boom", ApiKeySource::None), "");
    }
}
