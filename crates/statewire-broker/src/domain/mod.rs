//! Domain layer for the broker: configuration types.

pub mod config;

pub use config::{load_config, BrokerConfig, BrokerFileConfig, ConfigError};
