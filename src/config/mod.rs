//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::scoring::debounce::GESTURE_COOLDOWN_MS;
use crate::scoring::session::SESSION_IDLE_TIMEOUT;
use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// Default cap on concurrently hosted scoreboards
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; any origin when unset
    pub client_origin: Option<String>,

    /// Minimum gap between accepted gestures on one side
    pub gesture_cooldown_ms: u64,
    /// Inbound WebSocket messages allowed per connection per second
    pub input_rate_limit: u32,
    /// Maximum number of live sessions
    pub max_sessions: usize,
    /// How long a session with no connections and no input is kept
    pub session_idle_timeout: Duration,
    /// Directory holding the scoreboard page
    pub static_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // PORT wins (hosting platforms set it), then SERVER_ADDR
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:5050".to_string()),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: lookup("CLIENT_ORIGIN").filter(|s| !s.trim().is_empty()),

            gesture_cooldown_ms: parse_or(&lookup, "GESTURE_COOLDOWN_MS", GESTURE_COOLDOWN_MS)?,
            input_rate_limit: parse_or(&lookup, "INPUT_RATE_LIMIT", INPUT_RATE_LIMIT)?,
            max_sessions: parse_or(&lookup, "MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?,
            session_idle_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SESSION_IDLE_SECS",
                SESSION_IDLE_TIMEOUT.as_secs(),
            )?),
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = assert_ok!(Config::from_lookup(lookup(&[])));
        assert_eq!(config.server_addr.port(), 5050);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.gesture_cooldown_ms, 1200);
        assert_eq!(config.input_rate_limit, 60);
        assert_eq!(config.max_sessions, 64);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(300));
        assert!(config.client_origin.is_none());
        assert_eq!(config.static_dir, PathBuf::from("static"));
    }

    #[test]
    fn test_port_overrides_server_addr() {
        let config = assert_ok!(Config::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("SERVER_ADDR", "127.0.0.1:7000"),
        ])));
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn test_server_addr_used_without_port() {
        let config = assert_ok!(Config::from_lookup(lookup(&[("SERVER_ADDR", "127.0.0.1:7000")])));
        assert_eq!(config.server_addr.to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn test_invalid_port() {
        let err = assert_err!(Config::from_lookup(lookup(&[("PORT", "http")])));
        assert!(matches!(err, ConfigError::InvalidAddress));
    }

    #[test]
    fn test_invalid_cooldown() {
        let err = assert_err!(Config::from_lookup(lookup(&[("GESTURE_COOLDOWN_MS", "soon")])));
        assert!(matches!(err, ConfigError::Invalid("GESTURE_COOLDOWN_MS")));
    }

    #[test]
    fn test_session_idle_timeout() {
        let config = assert_ok!(Config::from_lookup(lookup(&[("SESSION_IDLE_SECS", "30")])));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(30));

        let err = assert_err!(Config::from_lookup(lookup(&[("SESSION_IDLE_SECS", "-1")])));
        assert!(matches!(err, ConfigError::Invalid("SESSION_IDLE_SECS")));
    }

    #[test]
    fn test_blank_origin_means_any() {
        let config = assert_ok!(Config::from_lookup(lookup(&[("CLIENT_ORIGIN", "  ")])));
        assert!(config.client_origin.is_none());
    }
}
