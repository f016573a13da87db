//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! nickname = ["cobalt"]
//! command_prefix = "/"
//! super_users = [10001]
//!
//! [connection]
//! url = "ws://127.0.0.1:6700"
//! access_token = "secret"
//!
//! [api]
//! timeout_secs = 30
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//! filters = { cobalt_framework = "trace" }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use cobalt_framework::Options;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CobaltConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bot identity and rule options.
    #[serde(default)]
    pub bot: BotConfig,

    /// Gateway connection.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Outbound call settings.
    #[serde(default)]
    pub api: ApiConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Bot-wide options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    /// Names that address the bot at the start of a message.
    #[serde(default)]
    pub nickname: Vec<String>,

    /// Prefix of commands. May be empty.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Users granted super user permission.
    #[serde(default)]
    pub super_users: Vec<i64>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nickname: Vec::new(),
            command_prefix: default_command_prefix(),
            super_users: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Converts to the engine's options.
    pub fn to_options(&self) -> Options {
        Options {
            nickname: self.nickname.clone(),
            command_prefix: self.command_prefix.clone(),
            super_users: self.super_users.clone(),
        }
    }
}

fn default_command_prefix() -> String {
    "/".to_string()
}

// =============================================================================
// Connection and API
// =============================================================================

/// Gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket URL of the gateway.
    #[serde(default = "default_url")]
    pub url: String,

    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            access_token: None,
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:6700".to_string()
}

/// Outbound call settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    /// Seconds to wait for a reply before a call fails with a timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Capacity of the outbound and inbound frame queues.
    #[serde(default = "default_buffer")]
    pub outbound_buffer: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            outbound_buffer: default_buffer(),
        }
    }
}

impl ApiConfig {
    /// The call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    cobalt_core::DEFAULT_API_TIMEOUT.as_secs()
}

fn default_buffer() -> usize {
    cobalt_core::DEFAULT_BUFFER
}

// =============================================================================
// Logging
// =============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used with `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-target levels, e.g. `cobalt_framework = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Span lifecycle events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// The matching `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CobaltConfig::default();
        assert_eq!(config.bot.command_prefix, "/");
        assert_eq!(config.connection.url, "ws://127.0.0.1:6700");
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.api.outbound_buffer, 256);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn bot_config_to_options() {
        let bot = BotConfig {
            nickname: vec!["cobalt".into()],
            command_prefix: "#".into(),
            super_users: vec![1, 2],
        };
        let options = bot.to_options();
        assert_eq!(options.nickname, vec!["cobalt".to_string()]);
        assert_eq!(options.command_prefix, "#");
        assert_eq!(options.super_users, vec![1, 2]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: CobaltConfig = serde_json::from_value(serde_json::json!({
            "bot": { "nickname": ["co"] },
            "logging": { "level": "debug", "filters": { "cobalt_core": "trace" } }
        }))
        .unwrap();

        assert_eq!(config.bot.nickname, vec!["co".to_string()]);
        assert_eq!(config.bot.command_prefix, "/");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.filters["cobalt_core"], LogLevel::Trace);
        assert_eq!(config.api, ApiConfig::default());
    }
}
