//! Persistence seam for requests, solutions, scores, and results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreResult;

/// Persistence interface for everything the dispatcher records.
///
/// Each method is a synchronous, fallible side effect with no retry:
/// a failed write surfaces as a terminal ERRORED status for the affected
/// solution or request.
///
/// # Consistency Contract
///
/// Implementations must provide read-after-write consistency: once a
/// `persist_*` call returns `Ok`, any subsequent read through the backing
/// store observes the write. The dispatcher broadcasts each status
/// immediately after persisting it and listeners are entitled to query
/// the store on receipt, so an eventually-consistent backend would leak
/// stale reads to listeners.
#[async_trait]
pub trait SolutionStore: Send + Sync {
    /// Record a search request and its current progress label.
    async fn persist_request(
        &self,
        request_id: Uuid,
        dataset_id: &str,
        progress: &str,
        created: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Record a candidate solution's progress transition.
    async fn persist_solution(
        &self,
        request_id: Uuid,
        solution_id: &str,
        progress: &str,
        error: Option<&str>,
        created: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Record one computed metric value for a solution.
    async fn persist_solution_score(
        &self,
        solution_id: &str,
        metric: &str,
        score: f64,
    ) -> CoreResult<()>;

    /// Record the fitted-solution identifier and the produced result's
    /// identity for a solution.
    async fn persist_solution_result(
        &self,
        solution_id: &str,
        fitted_solution_id: &str,
        result_id: &str,
        result_uri: &str,
        progress: &str,
        created: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Record a produced result by its content-addressed identifier.
    async fn persist_result(
        &self,
        result_id: &str,
        result_uri: &str,
        created: DateTime<Utc>,
    ) -> CoreResult<()>;
}
