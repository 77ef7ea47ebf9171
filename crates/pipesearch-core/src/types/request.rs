//! The immutable search-request description.

use serde::{Deserialize, Serialize};

use super::pipeline::PipelineDescription;

/// Task classification of a search, as understood by the remote engine.
///
/// The task type also selects the default dataset split strategy:
/// forecasting tasks split on time, classification tasks stratify on the
/// target column, everything else splits randomly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
    Forecasting,
    Clustering,
}

/// Scoring metrics the caller wants computed for every candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Accuracy,
    F1Macro,
    RocAuc,
    MeanSquaredError,
    MeanAbsoluteError,
    RSquared,
}

impl Metric {
    /// Stable key used in the wire protocol and in persisted score rows.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::F1Macro => "f1Macro",
            Metric::RocAuc => "rocAuc",
            Metric::MeanSquaredError => "meanSquaredError",
            Metric::MeanAbsoluteError => "meanAbsoluteError",
            Metric::RSquared => "rSquared",
        }
    }
}

/// Immutable description of a model-search task.
///
/// Created once per user-initiated search and never mutated after
/// submission; the dispatcher owns a copy for the lifetime of the
/// orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Identity of the dataset the search runs against.
    pub dataset_id: String,
    /// Name of the column being predicted.
    pub target_feature: String,
    pub task_type: TaskType,
    /// Optional finer-grained classification (e.g. "binary", "multiClass").
    pub subtask: Option<String>,
    pub metrics: Vec<Metric>,
    /// Time budget handed to the remote engine, in minutes.
    pub time_budget_minutes: u64,
    /// Feature columns the search is restricted to; empty means all.
    pub features: Vec<String>,
    /// Optional preprocessing pipeline the engine must start from.
    pub template: Option<PipelineDescription>,
}

impl SearchRequest {
    pub fn new(dataset_id: impl Into<String>, target_feature: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            target_feature: target_feature.into(),
            task_type,
            subtask: None,
            metrics: Vec::new(),
            time_budget_minutes: 5,
            features: Vec::new(),
            template: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_template(mut self, template: PipelineDescription) -> Self {
        self.template = Some(template);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_keys() {
        assert_eq!(Metric::F1Macro.key(), "f1Macro");
        assert_eq!(Metric::MeanSquaredError.key(), "meanSquaredError");
    }

    #[test]
    fn test_request_builder() {
        let req = SearchRequest::new("ds_1852", "price", TaskType::Regression)
            .with_metrics(vec![Metric::MeanSquaredError]);
        assert_eq!(req.dataset_id, "ds_1852");
        assert_eq!(req.metrics.len(), 1);
        assert!(req.template.is_none());
    }
}
