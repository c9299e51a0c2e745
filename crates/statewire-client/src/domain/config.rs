//! Relay client configuration.
//!
//! [`RelayConfig`] enumerates every recognized option with its default, in
//! one place, and is validated exactly once at construction time. Serde
//! defaults mean a config deserialized from TOML or JSON may specify only
//! the fields it cares about.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use statewire_core::Filter;

/// Error type for configuration validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be non-zero")]
    InvalidPort,

    #[error("empty pattern in {list}")]
    EmptyPattern { list: &'static str },

    #[error("send_to must be an http(s) URL, got {0:?}")]
    InvalidSendTo(String),
}

/// When the client pushes state out on a reducer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendOnError {
    /// Never push on errors.
    #[default]
    Off,
    /// Push on reducer errors and on reported errors.
    Always,
    /// Push only when a computed snapshot carries an error marker.
    OnReducerError,
}

/// Action-type filter lists, as configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

/// All runtime configuration for the relay client.
///
/// Immutable once the session starts; build it, validate it, hand it to
/// [`crate::RelayClient::connect`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Broker hostname.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use TLS (`wss://` / `https://`).
    #[serde(default)]
    pub secure: bool,

    /// Reconnect automatically after a transport drop.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Width of the random jitter window added to each reconnect delay.
    #[serde(default = "default_jitter_ms")]
    pub auto_reconnect_jitter_ms: u64,

    /// Display name shown by monitors. Defaults to a name derived from the
    /// instance id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Retention window: once the live record count first exceeds this, the
    /// session's excess flag is set and relayed so observers can trim.
    #[serde(default = "default_max_age")]
    pub max_age: usize,

    /// Whitelist/blacklist over action types.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Action types that start monitoring when dispatched while stopped.
    #[serde(default)]
    pub start_on: Vec<String>,

    /// Action types that stop monitoring when dispatched.
    #[serde(default)]
    pub stop_on: Vec<String>,

    /// Action types that push the current history out-of-band.
    #[serde(default)]
    pub send_on: Vec<String>,

    /// Reducer-error push policy.
    #[serde(default)]
    pub send_on_error: SendOnError,

    /// Explicit HTTP fallback URL. Defaults to
    /// `{scheme}://{hostname}:{port}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_to: Option<String>,

    /// Connect and relay immediately instead of waiting for a trigger or an
    /// explicit start.
    #[serde(default = "default_true")]
    pub realtime: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            secure: false,
            auto_reconnect: true,
            auto_reconnect_jitter_ms: default_jitter_ms(),
            name: None,
            max_age: default_max_age(),
            filters: FilterConfig::default(),
            start_on: Vec::new(),
            stop_on: Vec::new(),
            send_on: Vec::new(),
            send_on_error: SendOnError::Off,
            send_to: None,
            realtime: true,
        }
    }
}

impl RelayConfig {
    /// Convenience constructor for the common host/port case.
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self { hostname: hostname.into(), port, ..Self::default() }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero port, an empty filter or trigger
    /// pattern, or a `send_to` URL without an http(s) scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let lists: [(&'static str, &[String]); 5] = [
            ("filters.whitelist", self.filters.whitelist.as_deref().unwrap_or(&[])),
            ("filters.blacklist", &self.filters.blacklist),
            ("start_on", &self.start_on),
            ("stop_on", &self.stop_on),
            ("send_on", &self.send_on),
        ];
        for (list, patterns) in lists {
            if patterns.iter().any(|p| p.is_empty()) {
                return Err(ConfigError::EmptyPattern { list });
            }
        }
        if let Some(url) = &self.send_to {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidSendTo(url.clone()));
            }
        }
        Ok(())
    }

    /// Builds the action filter from the configured lists.
    pub fn filter(&self) -> Filter {
        Filter::new(self.filters.whitelist.clone(), self.filters.blacklist.clone())
    }

    /// The WebSocket URL of the broker.
    pub fn socket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/", self.hostname, self.port)
    }

    /// The HTTP fallback URL: `send_to` when set, otherwise derived from the
    /// broker address.
    pub fn fallback_url(&self) -> String {
        match &self.send_to {
            Some(url) => url.clone(),
            None => {
                let scheme = if self.secure { "https" } else { "http" };
                format!("{scheme}://{}:{}", self.hostname, self.port)
            }
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_hostname() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_true() -> bool {
    true
}
fn default_jitter_ms() -> u64 {
    60_000
}
fn default_max_age() -> usize {
    30
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.hostname, "localhost");
        assert_eq!(cfg.port, 8000);
        assert!(!cfg.secure);
        assert!(cfg.auto_reconnect);
        assert_eq!(cfg.max_age, 30);
        assert_eq!(cfg.send_on_error, SendOnError::Off);
        assert!(cfg.realtime);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_socket_url_schemes() {
        let mut cfg = RelayConfig::new("broker.example", 9001);
        assert_eq!(cfg.socket_url(), "ws://broker.example:9001/");
        cfg.secure = true;
        assert_eq!(cfg.socket_url(), "wss://broker.example:9001/");
    }

    #[test]
    fn test_fallback_url_prefers_send_to() {
        let mut cfg = RelayConfig::new("broker.example", 9001);
        assert_eq!(cfg.fallback_url(), "http://broker.example:9001");
        cfg.send_to = Some("https://collector.example/ingest".to_string());
        assert_eq!(cfg.fallback_url(), "https://collector.example/ingest");
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let cfg = RelayConfig::new("localhost", 0);
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidPort));
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        let mut cfg = RelayConfig::default();
        cfg.start_on = vec![String::new()];
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyPattern { list: "start_on" }));
    }

    #[test]
    fn test_empty_whitelist_pattern_is_rejected() {
        let mut cfg = RelayConfig::default();
        cfg.filters.whitelist = Some(vec!["OK".to_string(), String::new()]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyPattern { list: "filters.whitelist" })
        );
    }

    #[test]
    fn test_send_to_requires_http_scheme() {
        let mut cfg = RelayConfig::default();
        cfg.send_to = Some("ftp://nope".to_string());
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSendTo(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: RelayConfig =
            serde_json::from_str(r#"{"hostname":"10.0.0.5","max_age":5}"#).unwrap();
        assert_eq!(cfg.hostname, "10.0.0.5");
        assert_eq!(cfg.max_age, 5);
        assert_eq!(cfg.port, 8000);
        assert!(cfg.auto_reconnect);
    }

    #[test]
    fn test_send_on_error_kebab_case_values() {
        let cfg: RelayConfig =
            serde_json::from_str(r#"{"send_on_error":"on-reducer-error"}"#).unwrap();
        assert_eq!(cfg.send_on_error, SendOnError::OnReducerError);
    }

    #[test]
    fn test_filter_built_from_lists() {
        let mut cfg = RelayConfig::default();
        cfg.filters.blacklist = vec!["TICK".to_string()];
        assert!(!cfg.filter().allows("CLOCK_TICK"));
        assert!(cfg.filter().allows("OTHER"));
    }
}
