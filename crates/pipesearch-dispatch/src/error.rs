//! Error types for the dispatch crate.

use thiserror::Error;

use pipesearch_client::ClientError;
use pipesearch_core::CoreError;

/// Failures surfaced by dispatch, submission, and explain operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Protocol-level failure from the client.
    #[error("Protocol client error: {0}")]
    Client(#[from] ClientError),

    /// Persistence, split, or configuration failure from the core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The search completed without yielding a usable result.
    #[error("No result produced: {0}")]
    NoResult(String),

    /// An explanation output could not be decoded.
    #[error("Explain parse error: {0}")]
    Explain(String),

    /// The dispatcher task disappeared before reporting a terminal
    /// status. Indicates a bug.
    #[error("Internal dispatch error: {0}")]
    Internal(String),
}

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
