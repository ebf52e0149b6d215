//! Collaborator-level error type.

use thiserror::Error;

/// Errors raised by a [`CompletionClient`](crate::CompletionClient).
///
/// The engine never retries any of these; it surfaces them as a node failure
/// and aborts the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The completion request failed (HTTP error, bad response, exhausted keys…).
    #[error("completion request failed: {0}")]
    Request(String),

    /// The caller aborted the in-flight request.
    #[error("completion request was cancelled")]
    Cancelled,

    /// The conversation transcript could not be loaded.
    #[error("could not load conversation history: {0}")]
    History(String),
}
