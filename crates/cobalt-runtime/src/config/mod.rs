//! Configuration module for the Cobalt runtime.
//!
//! Layered loading (defaults, files, `COBALT_*` environment variables) and
//! validation of the bot, connection, API and logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ApiConfig, BotConfig, CobaltConfig, ConnectionConfig, LogFormat, LogLevel, LogOutput,
    LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
