//! Client configuration.
//!
//! Read from environment variables (after `.env` is loaded by the binary).
//! API base URL: MARKETPLACE_API_URL > REACT_APP_API_URL > localhost default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default backend URL when nothing is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Route the user is sent to when the session cannot be renewed.
pub const LOGIN_ROUTE: &str = "/account/login";

/// Fixed client-side timeout applied to every HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the session-expiry watcher checks the stored expiry.
pub const DEFAULT_SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },
    #[error("Unknown session store {0:?} (expected keychain, file or memory)")]
    UnknownStore(String),
}

/// Where the persisted session record lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Keychain,
    /// JSON file; `None` means the default location in the user's data directory.
    File(Option<PathBuf>),
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keychain" => Ok(StoreKind::Keychain),
            "file" => Ok(StoreKind::File(None)),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(ConfigError::UnknownStore(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub session_check_interval: Duration,
    pub login_route: String,
    pub store: StoreKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session_check_interval: DEFAULT_SESSION_CHECK_INTERVAL,
            login_route: LOGIN_ROUTE.to_string(),
            store: StoreKind::File(None),
        }
    }
}

impl ClientConfig {
    /// Configuration for the given base URL with all other settings at defaults.
    pub fn with_base_url(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (the process environment in `from_env`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("MARKETPLACE_API_URL")
            .or_else(|| lookup("REACT_APP_API_URL"))
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(defaults.api_base_url);

        let request_timeout = seconds(&lookup, "MARKETPLACE_HTTP_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout);
        let connect_timeout = seconds(&lookup, "MARKETPLACE_CONNECT_TIMEOUT_SECS")?
            .unwrap_or(defaults.connect_timeout);
        let session_check_interval = seconds(&lookup, "MARKETPLACE_SESSION_CHECK_SECS")?
            .unwrap_or(defaults.session_check_interval);

        let mut store = match lookup("MARKETPLACE_SESSION_STORE") {
            Some(kind) => kind.parse()?,
            None => defaults.store,
        };
        if let (StoreKind::File(path), Some(custom)) =
            (&mut store, lookup("MARKETPLACE_SESSION_FILE"))
        {
            *path = Some(PathBuf::from(custom));
        }

        Ok(Self {
            api_base_url,
            request_timeout,
            connect_timeout,
            session_check_interval,
            login_route: defaults.login_route,
            store,
        })
    }
}

fn seconds<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::InvalidSeconds { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.login_route, "/account/login");
    }

    #[test]
    fn test_api_url_precedence() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("MARKETPLACE_API_URL", "https://api.example.com"),
            ("REACT_APP_API_URL", "https://fallback.example.com"),
        ]))
        .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com");

        let config =
            ClientConfig::from_lookup(lookup_from(&[("REACT_APP_API_URL", "https://fallback")]))
                .unwrap();
        assert_eq!(config.api_base_url, "https://fallback");
    }

    #[test]
    fn test_timeouts_and_store() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("MARKETPLACE_HTTP_TIMEOUT_SECS", "5"),
            ("MARKETPLACE_CONNECT_TIMEOUT_SECS", " 2 "),
            ("MARKETPLACE_SESSION_CHECK_SECS", "15"),
            ("MARKETPLACE_SESSION_STORE", "Keychain"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.session_check_interval, Duration::from_secs(15));
        assert_eq!(config.store, StoreKind::Keychain);
    }

    #[test]
    fn test_session_file_override() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("MARKETPLACE_SESSION_STORE", "file"),
            ("MARKETPLACE_SESSION_FILE", "/tmp/session.json"),
        ]))
        .unwrap();
        assert_eq!(
            config.store,
            StoreKind::File(Some(PathBuf::from("/tmp/session.json")))
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[(
            "MARKETPLACE_HTTP_TIMEOUT_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidSeconds {
                var: "MARKETPLACE_HTTP_TIMEOUT_SECS",
                value: "soon".to_string()
            }
        );

        let err = ClientConfig::from_lookup(lookup_from(&[("MARKETPLACE_SESSION_STORE", "redis")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownStore("redis".to_string()));
    }
}
