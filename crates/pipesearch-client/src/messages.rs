//! Typed messages exchanged with the remote search engine.
//!
//! Progress frames carry a discrete state; only `Completed` frames yield
//! persistable results, and callers filter for them after draining a
//! stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Remote-assigned identifier of a running search.
pub type SearchId = String;

/// Remote-assigned identifier of a score/fit/produce request.
pub type RemoteRequestId = String;

/// Discrete progress state attached to every streamed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressState {
    Unknown,
    Pending,
    Running,
    Completed,
    Errored,
}

impl ProgressState {
    pub fn is_completed(&self) -> bool {
        matches!(self, ProgressState::Completed)
    }
}

/// One frame of the search-results stream.
///
/// The engine emits keep-alive frames with an empty solution id; those
/// are no-ops and the client skips them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSolutionsResult {
    pub solution_id: String,
    pub progress: ProgressState,
    /// Engine-internal ranking score, when reported.
    pub internal_score: Option<f64>,
}

impl SearchSolutionsResult {
    /// Keep-alive or progress-only frame carrying no solution.
    pub fn is_empty(&self) -> bool {
        self.solution_id.is_empty()
    }
}

/// One computed metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub metric: String,
    pub value: f64,
}

/// One frame of a score-results stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub progress: ProgressState,
    pub scores: Vec<Score>,
}

/// One frame of a fit-results stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub progress: ProgressState,
    pub fitted_solution_id: String,
}

/// One frame of a produce-results stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProduceResult {
    pub progress: ProgressState,
    /// Exposed output key to result URI.
    pub exposed_outputs: HashMap<String, String>,
}

/// Parameters of a score round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub solution_id: String,
    pub dataset_uri: String,
    pub metrics: Vec<String>,
}

/// Parameters of a fit round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRequest {
    pub solution_id: String,
    pub dataset_uri: String,
}

/// Parameters of a produce round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProduceRequest {
    pub fitted_solution_id: String,
    pub dataset_uri: String,
    /// Output keys the engine must expose, e.g. `outputs.0`.
    pub exposed_outputs: Vec<String>,
}
