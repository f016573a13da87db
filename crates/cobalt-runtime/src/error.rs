//! Runtime error types.

use cobalt_core::TransportError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport could not connect.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A plugin's start hook failed.
    #[error("Failed to start plugin {name}: {reason}")]
    Plugin { name: String, reason: String },

    /// The gateway closed the connection.
    #[error("Connection closed: {}", .0.as_deref().unwrap_or("no reason given"))]
    Disconnected(Option<String>),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
