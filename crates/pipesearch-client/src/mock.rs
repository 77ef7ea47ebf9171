//! Scripted in-process engine for tests.
//!
//! # WARNING: TEST ONLY - DO NOT USE IN PRODUCTION
//!
//! `MockSearchEngine` plays back a scripted set of candidate solutions
//! through the full protocol shape (streams included) and records call
//! counts, so orchestration tests can assert on dispatch behavior
//! without a remote engine.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use pipesearch_core::types::SearchRequest;

use crate::engine::{MessageStream, SearchEngine, StreamBox};
use crate::error::{ClientError, ClientResult};
use crate::messages::{
    FitRequest, FitResult, ProduceRequest, ProduceResult, ProgressState, RemoteRequestId,
    ScoreRequest, ScoreResult, SearchId, SearchSolutionsResult,
};

/// Scripted behavior of one candidate solution.
#[derive(Debug, Clone)]
pub struct MockSolution {
    pub id: String,
    pub scores: Vec<(String, f64)>,
    pub result_uri: String,
    pub fail_score: bool,
    pub fail_fit: bool,
    pub fail_produce: bool,
}

impl MockSolution {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            result_uri: format!("file:///results/{}/predictions.csv", id),
            id,
            scores: vec![("accuracy".to_string(), 0.75)],
            fail_score: false,
            fail_fit: false,
            fail_produce: false,
        }
    }

    pub fn with_score(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.scores = vec![(metric.into(), value)];
        self
    }

    pub fn with_result_uri(mut self, uri: impl Into<String>) -> Self {
        self.result_uri = uri.into();
        self
    }

    pub fn failing_score(mut self) -> Self {
        self.fail_score = true;
        self
    }

    pub fn failing_fit(mut self) -> Self {
        self.fail_fit = true;
        self
    }

    pub fn failing_produce(mut self) -> Self {
        self.fail_produce = true;
        self
    }
}

/// A stream that plays back a fixed frame sequence then ends.
struct ScriptedStream<T> {
    frames: VecDeque<T>,
}

#[async_trait]
impl<T: Send> MessageStream<T> for ScriptedStream<T> {
    async fn recv(&mut self) -> ClientResult<Option<T>> {
        Ok(self.frames.pop_front())
    }
}

/// A stream that never yields; exercises the pull-timeout path.
struct SilentStream;

#[async_trait]
impl<T: Send> MessageStream<T> for SilentStream {
    async fn recv(&mut self) -> ClientResult<Option<T>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }
}

/// Scripted implementation of [`SearchEngine`].
///
/// # WARNING: TEST ONLY - DO NOT USE IN PRODUCTION
pub struct MockSearchEngine {
    solutions: Vec<MockSolution>,
    keepalive_frames: usize,
    silent_stream: bool,
    /// 1-based indexes of started searches whose stream never yields.
    silent_search_indexes: Vec<usize>,
    fail_start: bool,
    /// search ids resolved as silent at start time
    silent_ids: DashMap<String, ()>,
    /// score/fit/produce request id -> solution id
    requests: DashMap<String, String>,
    start_search_calls: AtomicUsize,
    stop_search_calls: AtomicUsize,
    end_search_calls: AtomicUsize,
}

impl MockSearchEngine {
    pub fn new(solutions: Vec<MockSolution>) -> Self {
        Self {
            solutions,
            keepalive_frames: 0,
            silent_stream: false,
            silent_search_indexes: Vec::new(),
            fail_start: false,
            silent_ids: DashMap::new(),
            requests: DashMap::new(),
            start_search_calls: AtomicUsize::new(0),
            stop_search_calls: AtomicUsize::new(0),
            end_search_calls: AtomicUsize::new(0),
        }
    }

    /// Interleave `count` keep-alive frames before the scripted solutions.
    pub fn with_keepalive_frames(mut self, count: usize) -> Self {
        self.keepalive_frames = count;
        self
    }

    /// Make every search-results stream never yield anything.
    pub fn with_silent_stream(mut self) -> Self {
        self.silent_stream = true;
        self
    }

    /// Make the `index`-th started search's stream (1-based) never yield,
    /// leaving other searches scripted normally.
    pub fn with_silent_search(mut self, index: usize) -> Self {
        self.silent_search_indexes.push(index);
        self
    }

    /// Make `start_search` fail with a connection error.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn start_search_count(&self) -> usize {
        self.start_search_calls.load(Ordering::SeqCst)
    }

    pub fn stop_search_count(&self) -> usize {
        self.stop_search_calls.load(Ordering::SeqCst)
    }

    pub fn end_search_count(&self) -> usize {
        self.end_search_calls.load(Ordering::SeqCst)
    }

    fn solution(&self, id: &str) -> ClientResult<&MockSolution> {
        self.solutions
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ClientError::Protocol(format!("unknown solution id {}", id)))
    }

    fn solution_for_request(&self, request_id: &str) -> ClientResult<MockSolution> {
        let solution_id = self
            .requests
            .get(request_id)
            .map(|v| v.clone())
            .ok_or_else(|| ClientError::Protocol(format!("unknown request id {}", request_id)))?;
        self.solution(&solution_id).cloned()
    }
}

#[async_trait]
impl SearchEngine for MockSearchEngine {
    async fn start_search(&self, _request: &SearchRequest) -> ClientResult<SearchId> {
        let index = self.start_search_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_start {
            return Err(ClientError::Connection(
                "mock engine refused the search".to_string(),
            ));
        }
        let search_id = format!("search-{}", index);
        if self.silent_search_indexes.contains(&index) {
            self.silent_ids.insert(search_id.clone(), ());
        }
        Ok(search_id)
    }

    async fn search_results(
        &self,
        search_id: &str,
    ) -> ClientResult<StreamBox<SearchSolutionsResult>> {
        if self.silent_stream || self.silent_ids.contains_key(search_id) {
            return Ok(Box::new(SilentStream));
        }

        let mut frames = VecDeque::new();
        for _ in 0..self.keepalive_frames {
            frames.push_back(SearchSolutionsResult {
                solution_id: String::new(),
                progress: ProgressState::Running,
                internal_score: None,
            });
        }
        for solution in &self.solutions {
            frames.push_back(SearchSolutionsResult {
                solution_id: solution.id.clone(),
                progress: ProgressState::Completed,
                internal_score: Some(0.5),
            });
        }
        Ok(Box::new(ScriptedStream { frames }))
    }

    async fn start_score(&self, request: &ScoreRequest) -> ClientResult<RemoteRequestId> {
        let solution = self.solution(&request.solution_id)?;
        if solution.fail_score {
            return Err(ClientError::Protocol(
                "mock engine rejected the score request".to_string(),
            ));
        }
        let request_id = format!("score-{}", request.solution_id);
        self.requests
            .insert(request_id.clone(), request.solution_id.clone());
        Ok(request_id)
    }

    async fn score_results(&self, request_id: &str) -> ClientResult<StreamBox<ScoreResult>> {
        let solution = self.solution_for_request(request_id)?;
        let frames = VecDeque::from(vec![
            ScoreResult {
                progress: ProgressState::Running,
                scores: Vec::new(),
            },
            ScoreResult {
                progress: ProgressState::Completed,
                scores: solution
                    .scores
                    .iter()
                    .map(|(metric, value)| crate::messages::Score {
                        metric: metric.clone(),
                        value: *value,
                    })
                    .collect(),
            },
        ]);
        Ok(Box::new(ScriptedStream { frames }))
    }

    async fn start_fit(&self, request: &FitRequest) -> ClientResult<RemoteRequestId> {
        let solution = self.solution(&request.solution_id)?;
        if solution.fail_fit {
            return Err(ClientError::Protocol(
                "mock engine rejected the fit request".to_string(),
            ));
        }
        let request_id = format!("fit-{}", request.solution_id);
        self.requests
            .insert(request_id.clone(), request.solution_id.clone());
        Ok(request_id)
    }

    async fn fit_results(&self, request_id: &str) -> ClientResult<StreamBox<FitResult>> {
        let solution = self.solution_for_request(request_id)?;
        let frames = VecDeque::from(vec![
            FitResult {
                progress: ProgressState::Running,
                fitted_solution_id: String::new(),
            },
            FitResult {
                progress: ProgressState::Completed,
                fitted_solution_id: format!("fitted-{}", solution.id),
            },
        ]);
        Ok(Box::new(ScriptedStream { frames }))
    }

    async fn start_produce(&self, request: &ProduceRequest) -> ClientResult<RemoteRequestId> {
        let solution_id = request
            .fitted_solution_id
            .strip_prefix("fitted-")
            .ok_or_else(|| {
                ClientError::Protocol(format!(
                    "unknown fitted solution id {}",
                    request.fitted_solution_id
                ))
            })?;
        let solution = self.solution(solution_id)?;
        if solution.fail_produce {
            return Err(ClientError::Protocol(
                "mock engine rejected the produce request".to_string(),
            ));
        }
        let request_id = format!("produce-{}", solution_id);
        self.requests
            .insert(request_id.clone(), solution_id.to_string());
        Ok(request_id)
    }

    async fn produce_results(&self, request_id: &str) -> ClientResult<StreamBox<ProduceResult>> {
        let solution = self.solution_for_request(request_id)?;
        let mut outputs = HashMap::new();
        outputs.insert("outputs.0".to_string(), solution.result_uri.clone());
        let frames = VecDeque::from(vec![
            ProduceResult {
                progress: ProgressState::Running,
                exposed_outputs: HashMap::new(),
            },
            ProduceResult {
                progress: ProgressState::Completed,
                exposed_outputs: outputs,
            },
        ]);
        Ok(Box::new(ScriptedStream { frames }))
    }

    async fn stop_search(&self, _search_id: &str) -> ClientResult<()> {
        self.stop_search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn end_search(&self, _search_id: &str) -> ClientResult<()> {
        self.end_search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
