//! Framework error types.

use thiserror::Error;

use cobalt_core::{ApiError, StateError};

use crate::matcher::MatcherId;

/// Errors raised by the dispatch loop and by handler-side helpers.
#[derive(Debug, Clone, Error)]
pub enum FrameworkError {
    /// A rule or handler panicked. Only the current event is abandoned.
    #[error("matcher {matcher} faulted: {message}")]
    HandlerFault {
        /// The matcher being evaluated when the fault occurred.
        matcher: MatcherId,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// A continuation's matcher was removed before a reply arrived.
    #[error("continuation closed before a reply arrived")]
    ContinuationClosed,

    /// An outbound call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Typed state extraction failed.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Result type for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;
