//! Pipeline descriptions as exchanged with the remote engine.
//!
//! A pipeline is a linear list of primitive steps plus the output
//! references the engine exposes after execution. The serialized JSON
//! form participates in the pipeline-cache key, so field order and naming
//! here are load-bearing for cache identity.

use serde::{Deserialize, Serialize};

/// Reference to a primitive implementation by its registry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveRef {
    /// Stable registry identifier, e.g. `primitives.learner.random_forest`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

/// One step of a described pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub primitive: PrimitiveRef,
    /// Produce methods this step exposes. The explainability augmentor
    /// appends additional entries here.
    pub outputs: Vec<String>,
    /// Free-form hyperparameters, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub hyperparams: serde_json::Value,
}

impl PipelineStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            primitive: PrimitiveRef {
                id: id.into(),
                name: name.into(),
            },
            outputs: vec!["produce".to_string()],
            hyperparams: serde_json::Value::Null,
        }
    }
}

/// A named output exposed by the executed pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// Output key, e.g. `outputs.0`.
    pub name: String,
    /// Locator of the producing step, e.g. `steps.3.produce`.
    pub data: String,
}

/// A full pipeline description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    /// Engine-assigned id, when the pipeline was described remotely.
    pub id: Option<String>,
    pub steps: Vec<PipelineStep>,
    pub outputs: Vec<OutputRef>,
}

impl PipelineDescription {
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        let outputs = match steps.len() {
            0 => Vec::new(),
            n => vec![OutputRef {
                name: "outputs.0".to_string(),
                data: format!("steps.{}.produce", n - 1),
            }],
        };
        Self {
            id: None,
            steps,
            outputs,
        }
    }

    /// Canonical JSON used for hashing. Serialization of a pipeline
    /// description is deterministic because all maps are struct-shaped.
    pub fn canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
