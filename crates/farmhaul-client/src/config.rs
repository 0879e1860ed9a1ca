//! Client configuration.

use crate::Backoff;
use farmhaul_core::Environment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEVELOPMENT_API: &str = "http://localhost:8000";
const PRODUCTION_API: &str = "https://api.farmhaul.app";
const NOTIFICATIONS_PATH: &str = "ws/notifications";

/// Settings shared by every service of one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub environment: Environment,
    /// Overrides the environment's API base URL.
    pub api_url: Option<String>,
    /// Overrides the WebSocket endpoint derived from the API base URL.
    pub ws_url: Option<String>,
    /// Deadline for each job mutation call.
    pub mutation_timeout_ms: u64,
    /// Deadline for one notification handshake.
    pub connect_timeout_ms: u64,
    pub reconnect: Backoff,
    /// Recent notifications kept by the unread ledger.
    pub history_capacity: usize,
    /// Recently seen event ids remembered for de-duplication. Zero disables it.
    pub dedup_window: usize,
    /// Where the session credential is persisted. In-memory when unset.
    pub session_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            api_url: None,
            ws_url: None,
            mutation_timeout_ms: 15_000,
            connect_timeout_ms: 10_000,
            reconnect: Backoff::default(),
            history_capacity: 50,
            dedup_window: 256,
            session_file: None,
        }
    }
}

impl ClientConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Base URL of the request/response API.
    pub fn api_base(&self) -> Result<Url, ConfigError> {
        let raw = self.api_url.as_deref().unwrap_or(match self.environment {
            Environment::Development => DEVELOPMENT_API,
            Environment::Production => PRODUCTION_API,
        });
        parse_url(raw)
    }

    /// Notification endpoint without credentials.
    ///
    /// Derived from the API base by switching `http`/`https` to `ws`/`wss`
    /// unless `ws_url` is set.
    pub fn notifications_endpoint(&self) -> Result<Url, ConfigError> {
        if let Some(raw) = &self.ws_url {
            return parse_url(raw);
        }
        let mut url = self.api_base()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::UnsupportedScheme(scheme.to_string()))?;
        let path = format!("{}/{}", url.path().trim_end_matches('/'), NOTIFICATIONS_PATH);
        url.set_path(&path);
        Ok(url)
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))
}

/// Error in client configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(String),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ws_endpoint_per_environment() {
        let dev = ClientConfig::default();
        assert_eq!(
            dev.notifications_endpoint().unwrap().as_str(),
            "ws://localhost:8000/ws/notifications"
        );

        let prod = ClientConfig {
            environment: Environment::Production,
            ..Default::default()
        };
        assert_eq!(
            prod.notifications_endpoint().unwrap().as_str(),
            "wss://api.farmhaul.app/ws/notifications"
        );
    }

    #[test]
    fn keeps_api_path_prefix() {
        let config = ClientConfig {
            api_url: Some("https://example.org/api/".into()),
            ..Default::default()
        };
        assert_eq!(
            config.notifications_endpoint().unwrap().as_str(),
            "wss://example.org/api/ws/notifications"
        );
    }

    #[test]
    fn explicit_ws_url_wins() {
        let config = ClientConfig {
            ws_url: Some("ws://10.0.0.2:9000/push".into()),
            ..Default::default()
        };
        assert_eq!(
            config.notifications_endpoint().unwrap().as_str(),
            "ws://10.0.0.2:9000/push"
        );
    }

    #[test]
    fn parses_partial_toml() {
        let config = ClientConfig::from_toml(
            r#"
            environment = "production"
            mutation_timeout_ms = 5000
            connect_timeout_ms = 2500

            [reconnect]
            strategy = "exponential"
            initial_ms = 500
            max_ms = 8000
            "#,
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.mutation_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(
            config.reconnect,
            Backoff::Exponential {
                initial_ms: 500,
                max_ms: 8000
            }
        );
        assert_eq!(config.history_capacity, 50);
        assert_eq!(ClientConfig::default().connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_bad_url() {
        let config = ClientConfig {
            api_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(matches!(config.api_base(), Err(ConfigError::InvalidUrl(_))));
    }
}
