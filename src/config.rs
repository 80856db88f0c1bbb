//! Configuration loading and persistence.
//!
//! Handles reading the webterm configuration file and layering environment
//! variable overrides on top. Command-line flags are applied last by the
//! binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::connection::Backoff;
use crate::constants;
use crate::protocol::WireTag;

/// Configuration for the webterm CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the web-terminal server (`http://` or `https://`).
    pub server_url: String,
    /// Consecutive failed reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Ceiling for the reconnect delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Interval in seconds between status polls.
    pub poll_interval: u64,
    /// Name of the envelope discriminator field sent on the wire.
    pub wire_tag: WireTag,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            max_reconnect_attempts: constants::RECONNECT_MAX_ATTEMPTS,
            base_delay_ms: constants::RECONNECT_BASE_DELAY.as_millis() as u64,
            max_delay_ms: constants::RECONNECT_MAX_DELAY.as_millis() as u64,
            poll_interval: constants::STATUS_POLL_INTERVAL.as_secs(),
            wire_tag: WireTag::default(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `WEBTERM_CONFIG_DIR` env var: explicit override
    /// 2. `WEBTERM_ENV=test` or unit tests: `<tmp>/webterm-test`
    /// 3. Default: platform config dir (e.g. `~/.config/webterm`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("WEBTERM_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if cfg!(test) || crate::env::is_test_mode() {
            std::env::temp_dir().join("webterm-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("webterm")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides. A missing or unreadable file falls back to
    /// defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from(&path).unwrap_or_else(|e| {
            log::debug!("Using default config ({e:#})");
            Self::default()
        });
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from an explicit file path without overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Applies `WEBTERM_*` overrides using `lookup` to resolve variables.
    ///
    /// Values that fail to parse are ignored and logged.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = lookup("WEBTERM_SERVER_URL") {
            self.server_url = server_url;
        }

        override_parsed(&lookup, "WEBTERM_MAX_RECONNECTS", &mut self.max_reconnect_attempts);
        override_parsed(&lookup, "WEBTERM_BASE_DELAY_MS", &mut self.base_delay_ms);
        override_parsed(&lookup, "WEBTERM_MAX_DELAY_MS", &mut self.max_delay_ms);
        override_parsed(&lookup, "WEBTERM_POLL_INTERVAL", &mut self.poll_interval);

        if let Some(tag) = lookup("WEBTERM_WIRE_TAG") {
            match tag.parse() {
                Ok(tag) => self.wire_tag = tag,
                Err(e) => log::warn!("Ignoring WEBTERM_WIRE_TAG: {e}"),
            }
        }
    }

    /// Persists the current configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reconnect backoff policy described by this configuration.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_reconnect_attempts,
        )
    }

    /// Interval between status polls (never zero).
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    /// Server URL without trailing slashes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// WebSocket URL for a session's terminal transport.
    ///
    /// `https://` servers map to `wss://`, `http://` servers to `ws://`.
    #[must_use]
    pub fn session_ws_url(&self, session_id: &str) -> String {
        format!(
            "{}/api/sessions/{}/ws",
            crate::ws::http_to_ws_scheme(self.base_url()),
            session_id
        )
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(e) => log::warn!("Ignoring {key}={raw:?}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.poll_interval, 5);
        assert_eq!(config.wire_tag, WireTag::Kind);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup_from(&[
            ("WEBTERM_SERVER_URL", "https://term.example.com"),
            ("WEBTERM_MAX_RECONNECTS", "3"),
            ("WEBTERM_BASE_DELAY_MS", "250"),
            ("WEBTERM_WIRE_TAG", "type"),
        ]));

        assert_eq!(config.server_url, "https://term.example.com");
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.wire_tag, WireTag::Type);
    }

    #[test]
    fn test_invalid_env_override_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup_from(&[
            ("WEBTERM_MAX_RECONNECTS", "lots"),
            ("WEBTERM_WIRE_TAG", "discriminator"),
        ]));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.wire_tag, WireTag::Kind);
    }

    #[test]
    fn test_session_ws_url_follows_transport_security() {
        let mut config = Config::default();
        config.server_url = "https://term.example.com/".to_string();
        assert_eq!(
            config.session_ws_url("abc-123"),
            "wss://term.example.com/api/sessions/abc-123/ws"
        );

        config.server_url = "http://localhost:8080".to_string();
        assert_eq!(
            config.session_ws_url("abc-123"),
            "ws://localhost:8080/api/sessions/abc-123/ws"
        );
    }

    #[test]
    fn test_load_from_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server_url": "http://10.0.0.2:9000", "poll_interval": 2}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server_url, "http://10.0.0.2:9000");
        assert_eq!(config.poll_interval, 2);
        assert_eq!(config.max_reconnect_attempts, 10);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_backoff_from_config() {
        let mut config = Config::default();
        config.base_delay_ms = 100;
        config.max_delay_ms = 1000;
        config.max_reconnect_attempts = 4;

        let backoff = config.backoff();
        assert_eq!(backoff.max_attempts(), 4);
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(1000));
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let mut config = Config::default();
        config.poll_interval = 0;
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
