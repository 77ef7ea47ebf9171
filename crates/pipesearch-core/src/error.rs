//! Error types for pipesearch-core.
//!
//! Defines the central [`CoreError`] taxonomy used throughout the
//! workspace's leaf components, along with the [`CoreResult<T>`] alias.
//! Protocol-level failures (connection/protocol) live in the client crate;
//! everything that can go wrong below the protocol boundary is here.

use thiserror::Error;

/// Top-level error type for core operations.
///
/// Variants map one-to-one onto the subsystem's failure classes: invalid
/// configuration, dataset partitioning failures, persistence write
/// failures, and field-level validation. None of these are retried by the
/// orchestrator; each surfaces exactly once at the call site that caused
/// it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration is invalid or missing.
    ///
    /// Raised during layered config loading or by `validate()` when a
    /// bound is out of range (e.g. a zero pull budget or a train ratio
    /// outside (0, 1]).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A dataset split could not be performed.
    ///
    /// Covers a missing designated column, an unparseable timestamp
    /// value, or an output layout that could not be written. Split errors
    /// abort the whole submission before any remote call is made.
    #[error("Split error: {0}")]
    Split(String),

    /// A persistence write failed.
    ///
    /// Surfaced as a terminal ERRORED status for the affected solution or
    /// request; never retried.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A field value failed validation constraints.
    #[error("Validation error: {field} - {message}")]
    Validation {
        /// Name of the field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },

    /// Error during serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An unexpected internal error occurred.
    ///
    /// These indicate bugs (invariant violations, impossible states) and
    /// should be reported.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Split(err.to_string())
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
