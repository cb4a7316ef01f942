//! Chat client configuration

use std::env;
use std::time::Duration;

/// Default candidate mount paths for the real-time endpoint, tried in order.
///
/// Deployments mount the socket server at different prefixes; the list is
/// injectable via `CHAT_SOCKET_PATHS` so a new mount point never requires a
/// rebuild.
const DEFAULT_SOCKET_PATHS: &[&str] = &["/ws/socket.io", "/socket.io", "/ws"];

/// Chat client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the REST API, e.g. "https://api.example.com"
    pub api_base_url: String,
    /// Base URL of the real-time endpoint, e.g. "wss://api.example.com"
    pub socket_base_url: String,
    /// Ordered candidate mount paths for the real-time endpoint
    pub socket_paths: Vec<String>,
    /// Per-candidate connection attempt timeout
    pub connect_timeout: Duration,
    /// Timeout for REST requests (rooms, history, mark-read)
    pub request_timeout: Duration,
    /// Quiet window after which a typing indicator expires on its own
    pub typing_expiry: Duration,
    /// Maximum number of messages fetched when backfilling room history
    pub history_limit: u32,
    /// Total background reconnect attempts after an unexpected drop,
    /// counting the immediate first try; 0 disables reconnection
    pub reconnect_max_attempts: usize,
}

impl ChatConfig {
    /// Create a configuration with defaults for everything but the endpoints
    pub fn new(api_base_url: impl Into<String>, socket_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            socket_base_url: socket_base_url.into(),
            socket_paths: DEFAULT_SOCKET_PATHS.iter().map(|p| p.to_string()).collect(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            typing_expiry: Duration::from_secs(4),
            history_limit: 50,
            reconnect_max_attempts: 5,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_base_url =
            env::var("CHAT_API_BASE_URL").map_err(|_| ConfigError::Missing("CHAT_API_BASE_URL"))?;

        // Default the socket base to the API host with a websocket scheme
        let socket_base_url = env::var("CHAT_SOCKET_BASE_URL").unwrap_or_else(|_| {
            api_base_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        });

        let mut config = Self::new(api_base_url, socket_base_url);

        if let Ok(paths) = env::var("CHAT_SOCKET_PATHS") {
            let paths: Vec<String> = paths
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if paths.is_empty() {
                return Err(ConfigError::Invalid(
                    "CHAT_SOCKET_PATHS must list at least one path",
                ));
            }
            config.socket_paths = paths;
        }

        config.connect_timeout = duration_var("CHAT_CONNECT_TIMEOUT_MS", config.connect_timeout);
        config.request_timeout = duration_var("CHAT_REQUEST_TIMEOUT_MS", config.request_timeout);
        config.typing_expiry = duration_var("CHAT_TYPING_EXPIRY_MS", config.typing_expiry);

        config.history_limit = env::var("CHAT_HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.history_limit);
        config.reconnect_max_attempts = env::var("CHAT_RECONNECT_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.reconnect_max_attempts);

        Ok(config)
    }
}

fn duration_var(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::new("https://api.example.com", "wss://api.example.com");
        assert_eq!(config.socket_paths.len(), 3);
        assert_eq!(config.socket_paths[0], "/ws/socket.io");
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.typing_expiry, Duration::from_secs(4));
    }
}
