//! Phase-specific calls over one shared engine connection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use pipesearch_core::config::SearchConfig;
use pipesearch_core::types::SearchRequest;

use crate::cancel::CancelToken;
use crate::engine::{SearchEngine, StreamBox};
use crate::error::{ClientError, ClientResult};
use crate::messages::{
    FitRequest, FitResult, ProduceRequest, ProduceResult, RemoteRequestId, ScoreRequest,
    ScoreResult, SearchId, SearchSolutionsResult,
};

/// Outcome of one bounded pull.
enum Pulled<T> {
    Frame(T),
    /// Stream ended cleanly or the pull budget/timeout ran out.
    Done,
}

/// Client for the remote search engine's multi-phase protocol.
///
/// Wraps one shared connection. All phase calls accept a [`CancelToken`];
/// cancellation aborts the in-flight await with
/// [`ClientError::Cancelled`]. Streamed responses are drained with a
/// bounded polling loop: at most `pull_max` pulls, each bounded by
/// `pull_timeout`, never an unbounded blocking receive.
pub struct SearchClient {
    engine: Arc<dyn SearchEngine>,
    pull_max: usize,
    pull_timeout: Duration,
}

impl SearchClient {
    pub fn new(engine: Arc<dyn SearchEngine>, config: &SearchConfig) -> Self {
        Self {
            engine,
            pull_max: config.pull_max,
            pull_timeout: Duration::from_millis(config.pull_timeout_ms),
        }
    }

    /// Submit a search. Single round trip.
    pub async fn start_search(
        &self,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> ClientResult<SearchId> {
        let search_id = guarded(cancel, self.engine.start_search(request)).await?;
        if search_id.is_empty() {
            return Err(ClientError::Protocol(
                "engine returned an empty search id".to_string(),
            ));
        }
        debug!(%search_id, "search started");
        Ok(search_id)
    }

    /// Stream discovered candidate solutions, spawning one independent
    /// handler invocation per non-empty message.
    ///
    /// The loop does not wait for a handler before pulling the next
    /// message, which is what lets fit/score/produce run for many
    /// candidates in parallel. The call still blocks until the stream
    /// ends or the pull budget is exhausted, then joins every spawned
    /// handler before returning, so the caller regains control only once
    /// all candidate work has finished.
    ///
    /// Returns the number of handlers spawned.
    pub async fn stream_search_results<F, Fut>(
        &self,
        search_id: &str,
        cancel: &CancelToken,
        handler: F,
    ) -> ClientResult<usize>
    where
        F: Fn(SearchSolutionsResult) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut stream = guarded(cancel, self.engine.search_results(search_id)).await?;

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        let mut outcome = Ok(());
        for _ in 0..self.pull_max {
            match self.pull(&mut stream, cancel).await {
                Ok(Pulled::Frame(frame)) => {
                    if frame.is_empty() {
                        debug!(%search_id, "skipping keep-alive frame");
                        continue;
                    }
                    handles.push(tokio::spawn(handler(frame)));
                }
                Ok(Pulled::Done) => break,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        // Join every spawned handler before returning, error path
        // included; candidates already dispatched must run to their
        // terminal state.
        let spawned = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(%search_id, error = %e, "solution handler panicked");
            }
        }

        outcome.map(|_| spawned)
    }

    /// Score a solution against a held-out test partition, draining the
    /// full progress stream.
    pub async fn score_solution(
        &self,
        request: &ScoreRequest,
        cancel: &CancelToken,
    ) -> ClientResult<Vec<ScoreResult>> {
        let request_id = guarded(cancel, self.engine.start_score(request)).await?;
        let stream = guarded(cancel, self.engine.score_results(&request_id)).await?;
        self.drain(stream, cancel).await
    }

    /// Fit a solution, draining the full progress stream.
    pub async fn fit_solution(
        &self,
        request: &FitRequest,
        cancel: &CancelToken,
    ) -> ClientResult<Vec<FitResult>> {
        let request_id = guarded(cancel, self.engine.start_fit(request)).await?;
        let stream = guarded(cancel, self.engine.fit_results(&request_id)).await?;
        self.drain(stream, cancel).await
    }

    /// Produce predictions from a fitted solution, draining the full
    /// progress stream. Returns the produce request id alongside the
    /// frames so the caller can correlate persisted results.
    pub async fn produce_solution(
        &self,
        request: &ProduceRequest,
        cancel: &CancelToken,
    ) -> ClientResult<(RemoteRequestId, Vec<ProduceResult>)> {
        let request_id = guarded(cancel, self.engine.start_produce(request)).await?;
        let stream = guarded(cancel, self.engine.produce_results(&request_id)).await?;
        let frames = self.drain(stream, cancel).await?;
        Ok((request_id, frames))
    }

    /// Ask the engine to stop discovering candidates. Idempotent from the
    /// caller's perspective.
    pub async fn stop_search(&self, search_id: &str, cancel: &CancelToken) -> ClientResult<()> {
        guarded(cancel, self.engine.stop_search(search_id)).await
    }

    /// Release engine-side search resources. Idempotent from the caller's
    /// perspective.
    pub async fn end_search(&self, search_id: &str) -> ClientResult<()> {
        self.engine.end_search(search_id).await
    }

    /// One bounded pull from a stream.
    async fn pull<T>(
        &self,
        stream: &mut StreamBox<T>,
        cancel: &CancelToken,
    ) -> ClientResult<Pulled<T>> {
        let pulled = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            res = timeout(self.pull_timeout, stream.recv()) => res,
        };
        match pulled {
            Ok(Ok(Some(frame))) => Ok(Pulled::Frame(frame)),
            Ok(Ok(None)) => Ok(Pulled::Done),
            Ok(Err(e)) => Err(e),
            // Per-pull timeout elapsed; treat the stream as drained.
            Err(_) => Ok(Pulled::Done),
        }
    }

    /// Drain a progress stream under the bounded-pull policy,
    /// accumulating every frame.
    async fn drain<T>(&self, mut stream: StreamBox<T>, cancel: &CancelToken) -> ClientResult<Vec<T>> {
        let mut frames = Vec::new();
        for _ in 0..self.pull_max {
            match self.pull(&mut stream, cancel).await? {
                Pulled::Frame(frame) => frames.push(frame),
                Pulled::Done => break,
            }
        }
        Ok(frames)
    }
}

async fn guarded<T>(
    cancel: &CancelToken,
    fut: impl Future<Output = ClientResult<T>>,
) -> ClientResult<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::mock::{MockSearchEngine, MockSolution};
    use pipesearch_core::types::{SearchRequest, TaskType};

    fn test_config() -> SearchConfig {
        SearchConfig {
            pull_max: 64,
            pull_timeout_ms: 200,
            time_budget_minutes: 1,
        }
    }

    fn request() -> SearchRequest {
        SearchRequest::new("ds_1852", "target", TaskType::Classification)
    }

    #[tokio::test]
    async fn test_stream_skips_keepalive_frames() {
        let engine = MockSearchEngine::new(vec![
            MockSolution::new("s-1"),
            MockSolution::new("s-2"),
        ])
        .with_keepalive_frames(3);
        let client = SearchClient::new(Arc::new(engine), &test_config());
        let cancel = CancelToken::new();

        let search_id = client.start_search(&request(), &cancel).await.unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = seen.clone();
        let spawned = client
            .stream_search_results(&search_id, &cancel, move |frame| {
                let seen = seen_in_handler.clone();
                async move {
                    assert!(!frame.solution_id.is_empty());
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert_eq!(spawned, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stream_joins_handlers_before_returning() {
        let engine = MockSearchEngine::new(vec![MockSolution::new("s-1")]);
        let client = SearchClient::new(Arc::new(engine), &test_config());
        let cancel = CancelToken::new();

        let search_id = client.start_search(&request(), &cancel).await.unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let done_in_handler = done.clone();
        client
            .stream_search_results(&search_id, &cancel, move |_frame| {
                let done = done_in_handler.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        // The slow handler must have finished by the time the call returns.
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pull_budget_bounds_a_silent_stream() {
        let engine = MockSearchEngine::new(vec![MockSolution::new("s-1")]).with_silent_stream();
        let config = SearchConfig {
            pull_max: 4,
            pull_timeout_ms: 20,
            time_budget_minutes: 1,
        };
        let client = SearchClient::new(Arc::new(engine), &config);
        let cancel = CancelToken::new();

        let search_id = client.start_search(&request(), &cancel).await.unwrap();
        // A stream that never yields must not hang the caller.
        let spawned = client
            .stream_search_results(&search_id, &cancel, |_frame| async {})
            .await
            .unwrap();
        assert_eq!(spawned, 0);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_call() {
        let engine = MockSearchEngine::new(vec![MockSolution::new("s-1")]).with_silent_stream();
        let client = Arc::new(SearchClient::new(Arc::new(engine), &test_config()));
        let cancel = CancelToken::new();

        let search_id = client.start_search(&request(), &cancel).await.unwrap();
        let streaming = {
            let client = client.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .stream_search_results(&search_id, &cancel, |_frame| async {})
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let result = streaming.await.unwrap();
        assert_eq!(result.unwrap_err(), ClientError::Cancelled);
    }

    #[tokio::test]
    async fn test_score_filters_to_completed_frames() {
        let engine =
            MockSearchEngine::new(vec![MockSolution::new("s-1").with_score("accuracy", 0.87)]);
        let client = SearchClient::new(Arc::new(engine), &test_config());
        let cancel = CancelToken::new();

        let frames = client
            .score_solution(
                &ScoreRequest {
                    solution_id: "s-1".to_string(),
                    dataset_uri: "file:///data/test".to_string(),
                    metrics: vec!["accuracy".to_string()],
                },
                &cancel,
            )
            .await
            .unwrap();

        // Running frames precede the completed frame; only the completed
        // one carries scores.
        assert!(frames.len() >= 2);
        let completed: Vec<_> = frames.iter().filter(|f| f.progress.is_completed()).collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].scores[0].value, 0.87);
    }

    #[tokio::test]
    async fn test_start_failure_surfaces_connection_error() {
        let engine = MockSearchEngine::new(vec![]).with_start_failure();
        let client = SearchClient::new(Arc::new(engine), &test_config());
        let cancel = CancelToken::new();

        let err = client.start_search(&request(), &cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }
}
