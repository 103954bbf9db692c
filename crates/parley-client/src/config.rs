//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so a development client starts against a
//! server on localhost with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use parley_net::{BackoffConfig, TransportConfig};
use parley_shared::constants::{
    DEFAULT_API_URL, DEFAULT_WS_URL, RECONNECT_INITIAL_BACKOFF, RECONNECT_MAX_BACKOFF,
    TYPING_TIMEOUT,
};
use parley_shared::UserId;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Realtime websocket endpoint.
    /// Env: `PARLEY_WS_URL`
    pub ws_url: String,

    /// REST API base URL.
    /// Env: `PARLEY_API_URL`
    pub api_url: String,

    /// Local SQLite file. `None` means the platform data directory.
    /// Env: `PARLEY_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Quiet period before "stop typing".
    /// Env: `PARLEY_TYPING_TIMEOUT_MS`
    pub typing_timeout: Duration,

    /// First reconnect delay.
    /// Env: `PARLEY_RECONNECT_INITIAL_MS`
    pub reconnect_initial: Duration,

    /// Reconnect delay cap.
    /// Env: `PARLEY_RECONNECT_MAX_MS`
    pub reconnect_max: Duration,

    /// Authenticated user the binary runs as.
    /// Env: `PARLEY_USER_ID`
    pub user_id: Option<UserId>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            db_path: None,
            typing_timeout: TYPING_TIMEOUT,
            reconnect_initial: RECONNECT_INITIAL_BACKOFF,
            reconnect_max: RECONNECT_MAX_BACKOFF,
            user_id: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("PARLEY_WS_URL") {
            config.ws_url = url;
        }

        if let Some(url) = lookup("PARLEY_API_URL") {
            config.api_url = url;
        }

        if let Some(path) = lookup("PARLEY_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(ms) = millis(&lookup, "PARLEY_TYPING_TIMEOUT_MS") {
            config.typing_timeout = ms;
        }

        if let Some(ms) = millis(&lookup, "PARLEY_RECONNECT_INITIAL_MS") {
            config.reconnect_initial = ms;
        }

        if let Some(ms) = millis(&lookup, "PARLEY_RECONNECT_MAX_MS") {
            config.reconnect_max = ms;
        }

        if let Some(id) = lookup("PARLEY_USER_ID") {
            if !id.is_empty() {
                config.user_id = Some(UserId::new(id));
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            url: self.ws_url.clone(),
            backoff: BackoffConfig::default()
                .with_initial(self.reconnect_initial)
                .with_max(self.reconnect_max),
            ..TransportConfig::default()
        }
    }
}

fn millis<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid duration, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> ClientConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.ws_url, "ws://localhost:5000");
        assert_eq!(config.typing_timeout, Duration::from_millis(3000));
        assert!(config.db_path.is_none());
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PARLEY_WS_URL", "ws://chat.example:9000"),
            ("PARLEY_TYPING_TIMEOUT_MS", "1500"),
            ("PARLEY_RECONNECT_MAX_MS", "2000"),
            ("PARLEY_USER_ID", "u1"),
        ]);
        assert_eq!(config.ws_url, "ws://chat.example:9000");
        assert_eq!(config.typing_timeout, Duration::from_millis(1500));
        assert_eq!(config.user_id, Some(UserId::from("u1")));

        let transport = config.transport();
        assert_eq!(transport.url, "ws://chat.example:9000");
        assert_eq!(transport.backoff.max, Duration::from_millis(2000));
    }

    #[test]
    fn test_invalid_duration_falls_back() {
        let config = config_from(&[
            ("PARLEY_TYPING_TIMEOUT_MS", "soon"),
            ("PARLEY_RECONNECT_INITIAL_MS", "0"),
        ]);
        assert_eq!(config.typing_timeout, TYPING_TIMEOUT);
        assert_eq!(config.reconnect_initial, RECONNECT_INITIAL_BACKOFF);
    }
}
