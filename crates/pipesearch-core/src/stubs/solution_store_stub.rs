//! In-memory stub implementation of SolutionStore.
//!
//! # Design
//!
//! - Uses `DashMap` for concurrent access without external locking
//! - Records every call so tests can assert on persisted transitions
//! - Supports per-solution fault injection for error-isolation tests
//!
//! Reads are consistent with completed writes, which satisfies the
//! read-after-write contract of the trait trivially.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::traits::SolutionStore;

/// One persisted solution-result row.
#[derive(Debug, Clone)]
pub struct SolutionResultRow {
    pub fitted_solution_id: String,
    pub result_id: String,
    pub result_uri: String,
    pub progress: String,
}

/// In-memory implementation of [`SolutionStore`].
///
/// # WARNING: TEST ONLY - DO NOT USE IN PRODUCTION
#[derive(Debug, Default)]
pub struct InMemorySolutionStore {
    /// request_id -> ordered progress labels
    requests: DashMap<Uuid, Vec<String>>,
    /// solution_id -> ordered progress labels
    solutions: DashMap<String, Vec<String>>,
    /// solution_id -> (metric, score) rows
    scores: DashMap<String, Vec<(String, f64)>>,
    /// solution_id -> result rows
    solution_results: DashMap<String, Vec<SolutionResultRow>>,
    /// result_id -> result_uri
    results: DashMap<String, String>,
    /// Solution ids whose writes should fail (fault injection).
    failing_solutions: DashMap<String, ()>,
}

impl InMemorySolutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write for `solution_id` fail with a
    /// persistence error.
    pub fn fail_solution(&self, solution_id: &str) {
        self.failing_solutions.insert(solution_id.to_string(), ());
    }

    fn check_fault(&self, solution_id: &str) -> CoreResult<()> {
        if self.failing_solutions.contains_key(solution_id) {
            return Err(CoreError::Persistence(format!(
                "injected write failure for solution {}",
                solution_id
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Query helpers for tests
    // ------------------------------------------------------------------

    /// Ids of every request that persisted anything.
    pub fn request_ids(&self) -> Vec<Uuid> {
        self.requests.iter().map(|e| *e.key()).collect()
    }

    /// Ordered progress labels persisted for a request.
    pub fn request_progress(&self, request_id: &Uuid) -> Vec<String> {
        self.requests
            .get(request_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Ordered progress labels persisted for a solution.
    pub fn solution_progress(&self, solution_id: &str) -> Vec<String> {
        self.solutions
            .get(solution_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Score rows persisted for a solution.
    pub fn score_rows(&self, solution_id: &str) -> Vec<(String, f64)> {
        self.scores
            .get(solution_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Result rows persisted for a solution.
    pub fn result_rows(&self, solution_id: &str) -> Vec<SolutionResultRow> {
        self.solution_results
            .get(solution_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// URI recorded for a result id.
    pub fn result_uri(&self, result_id: &str) -> Option<String> {
        self.results.get(result_id).map(|v| v.clone())
    }

    /// Number of distinct solutions that persisted anything.
    pub fn solution_count(&self) -> usize {
        self.solutions.len()
    }
}

#[async_trait]
impl SolutionStore for InMemorySolutionStore {
    async fn persist_request(
        &self,
        request_id: Uuid,
        _dataset_id: &str,
        progress: &str,
        _created: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.requests
            .entry(request_id)
            .or_default()
            .push(progress.to_string());
        Ok(())
    }

    async fn persist_solution(
        &self,
        _request_id: Uuid,
        solution_id: &str,
        progress: &str,
        _error: Option<&str>,
        _created: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.check_fault(solution_id)?;
        self.solutions
            .entry(solution_id.to_string())
            .or_default()
            .push(progress.to_string());
        Ok(())
    }

    async fn persist_solution_score(
        &self,
        solution_id: &str,
        metric: &str,
        score: f64,
    ) -> CoreResult<()> {
        self.check_fault(solution_id)?;
        self.scores
            .entry(solution_id.to_string())
            .or_default()
            .push((metric.to_string(), score));
        Ok(())
    }

    async fn persist_solution_result(
        &self,
        solution_id: &str,
        fitted_solution_id: &str,
        result_id: &str,
        result_uri: &str,
        progress: &str,
        _created: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.check_fault(solution_id)?;
        self.solution_results
            .entry(solution_id.to_string())
            .or_default()
            .push(SolutionResultRow {
                fitted_solution_id: fitted_solution_id.to_string(),
                result_id: result_id.to_string(),
                result_uri: result_uri.to_string(),
                progress: progress.to_string(),
            });
        Ok(())
    }

    async fn persist_result(
        &self,
        result_id: &str,
        result_uri: &str,
        _created: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.results
            .insert(result_id.to_string(), result_uri.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_labels_recorded_in_order() {
        let store = InMemorySolutionStore::new();
        let request_id = Uuid::new_v4();

        store
            .persist_solution(request_id, "s-1", "SOLUTION_PENDING", None, Utc::now())
            .await
            .unwrap();
        store
            .persist_solution(request_id, "s-1", "SOLUTION_FITTING", None, Utc::now())
            .await
            .unwrap();

        assert_eq!(
            store.solution_progress("s-1"),
            vec!["SOLUTION_PENDING", "SOLUTION_FITTING"]
        );
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemorySolutionStore::new();
        store.fail_solution("s-2");

        let err = store
            .persist_solution(Uuid::new_v4(), "s-2", "SOLUTION_PENDING", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Persistence(_)));

        // Other solutions are unaffected.
        store
            .persist_solution(Uuid::new_v4(), "s-3", "SOLUTION_PENDING", None, Utc::now())
            .await
            .unwrap();
    }
}
