//! Pipesearch Protocol Client
//!
//! Wraps one shared connection to the remote search engine behind the
//! [`SearchEngine`] transport trait and exposes the phase-specific calls
//! the dispatcher drives: start a search, stream discovered solutions,
//! score/fit/produce, stop and end. Streamed responses are consumed
//! through a bounded polling loop, never an unbounded blocking receive.
//!
//! The wire format itself is an external collaborator; this crate only
//! defines the typed messages the orchestrator needs.

pub mod cancel;
pub mod client;
pub mod engine;
pub mod error;
pub mod messages;
pub mod mock;

pub use cancel::CancelToken;
pub use client::SearchClient;
pub use engine::{MessageStream, SearchEngine};
pub use error::{ClientError, ClientResult};
