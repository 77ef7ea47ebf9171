//! Transport seam for the remote search engine.
//!
//! The concrete wire protocol (message schema, transport, auth) lives
//! behind these traits. [`SearchClient`](crate::client::SearchClient)
//! only ever talks to `dyn SearchEngine`, which keeps the orchestration
//! logic testable against the scripted mock.

use async_trait::async_trait;

use pipesearch_core::types::SearchRequest;

use crate::error::ClientResult;
use crate::messages::{
    FitRequest, FitResult, ProduceRequest, ProduceResult, RemoteRequestId, ScoreRequest,
    ScoreResult, SearchId, SearchSolutionsResult,
};

/// A server-streamed sequence of messages.
///
/// `recv` resolves with `Ok(None)` when the stream ends cleanly. The
/// client never blocks on it without a timeout.
#[async_trait]
pub trait MessageStream<T>: Send {
    async fn recv(&mut self) -> ClientResult<Option<T>>;
}

/// Boxed stream returned by the transport.
pub type StreamBox<T> = Box<dyn MessageStream<T>>;

/// One shared connection to the remote search engine.
///
/// Each paired operation follows the remote protocol's shape: a single
/// round trip starts the phase and returns an identifier, then a
/// server-streamed read delivers progress frames for it.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Submit a search. Single round trip.
    async fn start_search(&self, request: &SearchRequest) -> ClientResult<SearchId>;

    /// Open the stream of discovered candidate solutions for a search.
    async fn search_results(&self, search_id: &str) -> ClientResult<StreamBox<SearchSolutionsResult>>;

    /// Request scoring of a solution. Single round trip.
    async fn start_score(&self, request: &ScoreRequest) -> ClientResult<RemoteRequestId>;

    /// Open the score-progress stream for a score request.
    async fn score_results(&self, request_id: &str) -> ClientResult<StreamBox<ScoreResult>>;

    /// Request fitting of a solution. Single round trip.
    async fn start_fit(&self, request: &FitRequest) -> ClientResult<RemoteRequestId>;

    /// Open the fit-progress stream for a fit request.
    async fn fit_results(&self, request_id: &str) -> ClientResult<StreamBox<FitResult>>;

    /// Request predictions from a fitted solution. Single round trip.
    async fn start_produce(&self, request: &ProduceRequest) -> ClientResult<RemoteRequestId>;

    /// Open the produce-progress stream for a produce request.
    async fn produce_results(&self, request_id: &str) -> ClientResult<StreamBox<ProduceResult>>;

    /// Ask the engine to stop discovering candidates for a search.
    async fn stop_search(&self, search_id: &str) -> ClientResult<()>;

    /// Release all engine-side resources of a search.
    async fn end_search(&self, search_id: &str) -> ClientResult<()>;
}
