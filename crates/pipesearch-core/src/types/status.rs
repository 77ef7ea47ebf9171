//! Request and solution lifecycle states, and the status events that
//! carry them to listeners.
//!
//! Persisted state labels are stable strings (`REQUEST_RUNNING`,
//! `SOLUTION_PENDING`, ...); the enums here are the only place those
//! labels are produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states of one search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Pending,
    Running,
    Completed,
    Errored,
}

impl RequestState {
    /// `true` for states after which no further request transitions occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Errored)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequestState::Pending => "REQUEST_PENDING",
            RequestState::Running => "REQUEST_RUNNING",
            RequestState::Completed => "REQUEST_COMPLETED",
            RequestState::Errored => "REQUEST_ERRORED",
        };
        write!(f, "{}", label)
    }
}

/// Lifecycle states of one candidate solution.
///
/// A candidate progresses PENDING → FITTING → SCORING → PRODUCING →
/// COMPLETED in order; any failure short-circuits to ERRORED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolutionState {
    Pending,
    Fitting,
    Scoring,
    Producing,
    Completed,
    Errored,
}

impl SolutionState {
    /// `true` for states after which no further solution transitions occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SolutionState::Completed | SolutionState::Errored)
    }
}

impl std::fmt::Display for SolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SolutionState::Pending => "SOLUTION_PENDING",
            SolutionState::Fitting => "SOLUTION_FITTING",
            SolutionState::Scoring => "SOLUTION_SCORING",
            SolutionState::Producing => "SOLUTION_PRODUCING",
            SolutionState::Completed => "SOLUTION_COMPLETED",
            SolutionState::Errored => "SOLUTION_ERRORED",
        };
        write!(f, "{}", label)
    }
}

/// Either side of the nested state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusState {
    Request(RequestState),
    Solution(SolutionState),
}

impl std::fmt::Display for StatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusState::Request(s) => s.fmt(f),
            StatusState::Solution(s) => s.fmt(f),
        }
    }
}

/// One immutable progress event.
///
/// Emitted by the dispatcher, never mutated, consumed by the listeners
/// registered on the originating request's status bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub request_id: Uuid,
    /// Remote-assigned candidate id; `None` for request-level events.
    pub solution_id: Option<String>,
    pub state: StatusState,
    pub result_id: Option<String>,
    pub result_uri: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Build a request-level event.
    pub fn request(request_id: Uuid, state: RequestState) -> Self {
        Self {
            request_id,
            solution_id: None,
            state: StatusState::Request(state),
            result_id: None,
            result_uri: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a solution-level event.
    pub fn solution(request_id: Uuid, solution_id: &str, state: SolutionState) -> Self {
        Self {
            request_id,
            solution_id: Some(solution_id.to_string()),
            state: StatusState::Solution(state),
            result_id: None,
            result_uri: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach an error message, typically alongside an ERRORED state.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach the produced result's identifier and URI.
    pub fn with_result(mut self, result_id: impl Into<String>, result_uri: impl Into<String>) -> Self {
        self.result_id = Some(result_id.into());
        self.result_uri = Some(result_uri.into());
        self
    }

    /// `true` when this event terminates the whole request.
    ///
    /// The status bus relies on this to close subscriptions: the
    /// request-terminal event is guaranteed to be the last event any
    /// subscriber observes.
    pub fn is_request_terminal(&self) -> bool {
        matches!(self.state, StatusState::Request(s) if s.is_terminal())
    }
}
