//! Relay and client configuration.
//!
//! Values come from environment variables (a `.env` file in the working
//! directory is loaded first). Unset or unparsable values fall back to
//! [`Default`].

use std::path::PathBuf;
use std::time::Duration;

/// Default relay bind address.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default relay listening port.
pub const DEFAULT_PORT: u16 = 5174;
/// Upstream repository API.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.github.com";
/// Translation provider endpoint (Baidu general text translation).
pub const DEFAULT_PROVIDER_URL: &str = "https://fanyi-api.baidu.com/api/trans/vip/translate";
/// Request body cap for the relay.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;
/// Outbound request timeout for provider and upstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Translation provider credential pair.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub app_id: String,
    pub app_secret: String,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub upstream_base_url: String,
    /// Bearer credential for the upstream API. Requests go unauthenticated when unset.
    pub upstream_token: Option<String>,
    pub provider_url: String,
    /// Both halves must be present for `/translate` to work.
    pub credentials: Option<ProviderCredentials>,
    pub timeout: Duration,
    pub body_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            upstream_token: None,
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl RelayConfig {
    /// Build from the environment.
    ///
    /// - `RELAY_HOST` (default 127.0.0.1), `PORT` (default 5174)
    /// - `GITHUB_TOKEN`: upstream bearer credential (optional)
    /// - `UPSTREAM_BASE_URL` (default https://api.github.com)
    /// - `TRANSLATE_APP_ID`, `TRANSLATE_APP_SECRET`: provider credentials
    /// - `TRANSLATE_API_URL`: provider endpoint
    /// - `RELAY_TIMEOUT_SECS` (default 10), `RELAY_BODY_LIMIT` bytes (default 1 MiB)
    pub fn from_env() -> Self {
        load_dotenv();
        let default = Self::default();

        let credentials = match (non_empty_var("TRANSLATE_APP_ID"), non_empty_var("TRANSLATE_APP_SECRET")) {
            (Some(app_id), Some(app_secret)) => Some(ProviderCredentials { app_id, app_secret }),
            _ => None,
        };

        Self {
            host: non_empty_var("RELAY_HOST").unwrap_or(default.host),
            port: parsed_var("PORT").unwrap_or(default.port),
            upstream_base_url: non_empty_var("UPSTREAM_BASE_URL")
                .unwrap_or(default.upstream_base_url),
            upstream_token: non_empty_var("GITHUB_TOKEN"),
            provider_url: non_empty_var("TRANSLATE_API_URL").unwrap_or(default.provider_url),
            credentials,
            timeout: parsed_var("RELAY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.timeout),
            body_limit: parsed_var("RELAY_BODY_LIMIT").unwrap_or(default.body_limit),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Translation client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay `/translate` URL.
    pub endpoint: String,
    pub timeout: Duration,
    pub store_capacity: usize,
    pub store_ttl: Duration,
    /// SQLite file for the durable mirror. Memory-only when unset.
    pub mirror_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: format!("http://localhost:{DEFAULT_PORT}/translate"),
            timeout: DEFAULT_TIMEOUT,
            store_capacity: 200,
            store_ttl: Duration::from_secs(7 * 24 * 3600),
            mirror_path: None,
        }
    }
}

impl ClientConfig {
    /// Build from the environment.
    ///
    /// - `TRANSLATE_ENDPOINT`: relay translate URL
    /// - `TRANSLATION_CACHE_DB`: durable mirror database path
    pub fn from_env() -> Self {
        load_dotenv();
        let default = Self::default();
        Self {
            endpoint: non_empty_var("TRANSLATE_ENDPOINT").unwrap_or(default.endpoint),
            mirror_path: non_empty_var("TRANSLATION_CACHE_DB").map(PathBuf::from),
            ..default
        }
    }
}

fn load_dotenv() {
    let _ = dotenv::dotenv();
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_var(name).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let relay = RelayConfig::default();
        assert_eq!(relay.bind_addr(), "127.0.0.1:5174");
        assert_eq!(relay.body_limit, 1024 * 1024);
        assert_eq!(relay.timeout, Duration::from_secs(10));
        assert!(relay.credentials.is_none());

        let client = ClientConfig::default();
        assert_eq!(client.endpoint, "http://localhost:5174/translate");
        assert!(client.mirror_path.is_none());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let creds = ProviderCredentials {
            app_id: "A".into(),
            app_secret: "super-secret".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("super-secret"));
    }
}
