use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Upstream vehicle stream configuration
    #[serde(default)]
    pub feed: FeedConfig,
    /// Route shape layer configuration
    #[serde(default)]
    pub shapes: ShapesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (default: "0.0.0.0")
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// Port to listen on (default: 3000)
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        3000
    }
}

/// Configuration for the live vehicle stream
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the streaming API (default: "https://api-v3.mbta.com")
    #[serde(default = "FeedConfig::default_base_url")]
    pub base_url: String,
    /// API key for the streaming API. The stream stays disabled when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint to stream from (default: "vehicles")
    #[serde(default = "FeedConfig::default_endpoint")]
    pub endpoint: String,
    /// Raw filter fragment appended to the stream URL,
    /// e.g. "filter[route]=Red,Orange"
    #[serde(default)]
    pub filter_params: Option<String>,
    /// Whether to reconnect after a stream failure (default: true)
    #[serde(default = "FeedConfig::default_reconnect")]
    pub reconnect: bool,
    /// Base delay in seconds between reconnect attempts (default: 5)
    /// The delay grows with consecutive failures, up to one minute.
    #[serde(default = "FeedConfig::default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            endpoint: Self::default_endpoint(),
            filter_params: None,
            reconnect: Self::default_reconnect(),
            reconnect_delay_secs: Self::default_reconnect_delay_secs(),
        }
    }
}

impl FeedConfig {
    fn default_base_url() -> String {
        "https://api-v3.mbta.com".to_string()
    }
    fn default_endpoint() -> String {
        "vehicles".to_string()
    }
    fn default_reconnect() -> bool {
        true
    }
    fn default_reconnect_delay_secs() -> u64 {
        5
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShapesConfig {
    /// Path to a shape document to decode and serve. No layer when unset.
    #[serde(default)]
    pub document: Option<PathBuf>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_permissive);
        assert_eq!(config.feed.base_url, "https://api-v3.mbta.com");
        assert_eq!(config.feed.endpoint, "vehicles");
        assert!(config.feed.api_key.is_none());
        assert!(config.feed.reconnect);
        assert_eq!(config.feed.reconnect_delay_secs, 5);
        assert!(config.shapes.document.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
server:
  host: 127.0.0.1
  port: 8080
cors_origins:
  - https://map.example.com
feed:
  api_key: abc123
  filter_params: "filter[route]=Red"
  reconnect: false
shapes:
  document: data/shapes.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cors_origins, vec!["https://map.example.com"]);
        assert_eq!(config.feed.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.feed.filter_params.as_deref(), Some("filter[route]=Red"));
        assert!(!config.feed.reconnect);
        assert_eq!(
            config.shapes.document,
            Some(PathBuf::from("data/shapes.json"))
        );
    }
}
