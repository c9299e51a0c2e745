//! Broker configuration: runtime settings plus the optional TOML file they
//! can be loaded from.
//!
//! [`BrokerConfig`] is the resolved runtime form (a bound socket address).
//! [`BrokerFileConfig`] is the on-disk schema with serde defaults, so a
//! config file may specify only the fields it cares about. CLI flags take
//! precedence over the file; both fall back to the defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address and port the WebSocket listener binds to.
    pub bind_addr: SocketAddr,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            // Compile-time-known valid address string.
            bind_addr: "0.0.0.0:8000".parse().unwrap(),
        }
    }
}

// ── File schema ───────────────────────────────────────────────────────────────

/// On-disk broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerFileConfig {
    /// IP address to bind. `0.0.0.0` accepts connections from any interface.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// TCP port for the WebSocket listener.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for BrokerFileConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_port() }
    }
}

impl BrokerFileConfig {
    /// Resolves the file schema into the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBind`] when the address does not parse.
    pub fn into_broker_config(self) -> Result<BrokerConfig, ConfigError> {
        let addr = format!("{}:{}", self.bind_address, self.port);
        let bind_addr = addr.parse().map_err(|_| ConfigError::InvalidBind(addr))?;
        Ok(BrokerConfig { bind_addr })
    }
}

/// Loads the file config, returning defaults when the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<BrokerFileConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BrokerFileConfig::default()),
        Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_all_interfaces_on_8000() {
        let cfg = BrokerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 8000);
        assert_eq!(cfg.bind_addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_file_defaults_resolve() {
        let cfg = BrokerFileConfig::default().into_broker_config().unwrap();
        assert_eq!(cfg.bind_addr.port(), 8000);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let file: BrokerFileConfig = toml::from_str("").unwrap();
        assert_eq!(file, BrokerFileConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_port_only() {
        let file: BrokerFileConfig = toml::from_str("port = 9100").unwrap();
        assert_eq!(file.port, 9100);
        assert_eq!(file.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let file = BrokerFileConfig { bind_address: "not.an.ip".to_string(), port: 8000 };
        assert!(matches!(file.into_broker_config(), Err(ConfigError::InvalidBind(_))));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let result: Result<BrokerFileConfig, _> = toml::from_str("[[[ nope");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/statewire/broker.toml");
        let cfg = load_config(path).unwrap();
        assert_eq!(cfg, BrokerFileConfig::default());
    }

    #[test]
    fn test_file_round_trips_through_toml() {
        let file = BrokerFileConfig { bind_address: "127.0.0.1".to_string(), port: 9200 };
        let text = toml::to_string_pretty(&file).unwrap();
        let restored: BrokerFileConfig = toml::from_str(&text).unwrap();
        assert_eq!(restored, file);
    }
}
