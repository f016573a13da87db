//! Unified error types for the Cobalt core.
//!
//! This module provides the error taxonomy shared by the call/response gateway,
//! the frame codec and the per-matcher state. Framework-level errors (handler
//! faults, abandoned continuations) are defined in `cobalt-framework`.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Frame send failed.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound calls.
///
/// A plugin author sees these from [`Bot::call_api`](crate::Bot::call_api)
/// and every convenience wrapper built on top of it.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No correlated reply arrived within the configured bound.
    #[error("API call timed out")]
    Timeout,
    /// The transport went away while the call was outstanding.
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,
    /// The gateway answered with a failure status.
    #[error("API error ({retcode}): {message}")]
    Failed { retcode: i64, message: String },
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The event does not carry enough information to address a reply.
    #[error("missing session info")]
    MissingSession,
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// A malformed inbound frame.
///
/// The reader drops the frame, logs the error and keeps reading.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame is not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    Utf8(String),
    /// The frame is not valid JSON or does not fit the envelope.
    #[error("invalid frame JSON: {0}")]
    Json(String),
    /// The frame is neither a reply nor a known event category.
    #[error("unknown post_type '{0}'")]
    UnknownPostType(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// =============================================================================
// State Errors
// =============================================================================

/// Errors raised when extracting typed values out of a [`State`](crate::State).
///
/// Extraction fails loudly and locally: the state itself is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The key is not present.
    #[error("state key '{key}' is missing")]
    Missing {
        /// The missing key.
        key: String,
    },
    /// The stored value does not have the requested shape.
    #[error("state key '{key}' has an unexpected type: {reason}")]
    Mismatch {
        /// The offending key.
        key: String,
        /// Deserializer message.
        reason: String,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for frame decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for state extraction.
pub type StateResult<T> = Result<T, StateError>;
