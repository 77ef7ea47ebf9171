//! Protocol-level error types.

use thiserror::Error;

/// Failures surfaced by the protocol client.
///
/// Any round-trip failure is returned to the immediate caller; streaming
/// failures abort the stream and surface once. Retry policy belongs to
/// callers, never to this crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The remote engine is unreachable. Fatal to the call.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote response was malformed or unexpected. Fatal to the call.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The caller's cancellation token fired while the call was in flight.
    #[error("Call cancelled")]
    Cancelled,
}

/// Result type alias for protocol operations.
pub type ClientResult<T> = Result<T, ClientError>;
