//! Single-shot pipeline submission.
//!
//! Convenience entry point for callers that have a fully specified
//! pipeline and just want its execution result: hash the pipeline with
//! its inputs, return the cached result URI on a hit, otherwise drive a
//! search synchronously to completion and cache what it produced.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use pipesearch_core::types::{Metric, PipelineDescription, SearchRequest, TaskType};

use crate::cache::PipelineCache;
use crate::dispatcher::{SearchInputs, SolutionDispatcher};
use crate::error::{DispatchError, DispatchResult};

/// One fully-specified pipeline execution.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub pipeline: PipelineDescription,
    pub dataset_id: String,
    pub target_feature: String,
    pub task_type: TaskType,
    pub metrics: Vec<Metric>,
    pub time_budget_minutes: u64,
    /// Input dataset URIs (the train partition and any auxiliary inputs).
    pub dataset_uris: Vec<String>,
    /// Produce-input URIs (the partition predictions are made against).
    pub produce_uris: Vec<String>,
}

/// Search parameters folded into the cache key. Every field that can
/// change the engine's output for a fixed pipeline belongs here.
#[derive(Serialize)]
struct SearchParams<'a> {
    target_feature: &'a str,
    task_type: TaskType,
    metrics: &'a [Metric],
    time_budget_minutes: u64,
}

/// Cached, synchronous pipeline execution façade.
pub struct SubmitPipeline {
    dispatcher: Arc<SolutionDispatcher>,
    cache: Arc<PipelineCache>,
}

impl SubmitPipeline {
    pub fn new(dispatcher: Arc<SolutionDispatcher>, cache: Arc<PipelineCache>) -> Self {
        Self { dispatcher, cache }
    }

    /// Execute a pipeline, or return the cached result of an identical
    /// earlier execution.
    ///
    /// Two submissions with the same pipeline, input URIs, and search
    /// parameters issue exactly one remote dispatch; the second returns
    /// the first's result URI without a round trip.
    pub async fn submit(&self, submit: &SubmitRequest) -> DispatchResult<String> {
        let params = SearchParams {
            target_feature: &submit.target_feature,
            task_type: submit.task_type,
            metrics: &submit.metrics,
            time_budget_minutes: submit.time_budget_minutes,
        };
        let key = PipelineCache::key(
            &submit.pipeline,
            &submit.dataset_uris,
            &submit.produce_uris,
            &params,
        )?;

        if let Some(uri) = self.cache.get(key) {
            debug!(key, %uri, "pipeline cache hit");
            return Ok(uri);
        }

        let train_uri = submit
            .dataset_uris
            .first()
            .cloned()
            .ok_or_else(|| DispatchError::NoResult("no input dataset URI supplied".to_string()))?;
        let test_uri = submit
            .produce_uris
            .first()
            .cloned()
            .unwrap_or_else(|| train_uri.clone());

        let request = SearchRequest::new(
            submit.dataset_id.clone(),
            submit.target_feature.clone(),
            submit.task_type,
        )
        .with_metrics(submit.metrics.clone())
        .with_template(submit.pipeline.clone());
        let request = SearchRequest {
            time_budget_minutes: submit.time_budget_minutes,
            ..request
        };

        let handle = self
            .dispatcher
            .dispatch(request, SearchInputs::new(train_uri, test_uri))
            .await?;
        let mut subscription = handle.subscribe();
        handle.wait().await?;

        // The terminal event closed the subscription; drain it for the
        // produced result. A templated search yields one candidate, so
        // the last result-bearing event is the one to cache.
        let mut result_uri = None;
        while let Some(event) = subscription.recv().await {
            if let Some(uri) = event.result_uri {
                result_uri = Some(uri);
            }
        }
        let uri = result_uri.ok_or_else(|| {
            DispatchError::NoResult("search completed without a produced result".to_string())
        })?;

        self.cache.insert(key, uri.clone());
        info!(key, %uri, "pipeline executed and cached");
        Ok(uri)
    }
}
