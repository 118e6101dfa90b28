//! Configuration module for the Courier runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for the bot token, API endpoint, update intake and logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CourierConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, PollingConfig,
    SpanEventConfig, WebhookConfig,
};
pub use validation::validate_config;
