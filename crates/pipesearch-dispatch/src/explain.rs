//! Explainability augmentor.
//!
//! Inspects a solution's described pipeline for primitives with known
//! explain-capable produce methods and rewrites the pipeline to expose
//! those outputs, recording per explain kind where the output lives and
//! how to decode it. Pooled pre-featurized datasets are never
//! explainable: their features carry no per-row or per-feature meaning
//! to attribute.

use std::collections::HashMap;

use pipesearch_core::dataset::TableData;
use pipesearch_core::types::{OutputRef, PipelineDescription};

use crate::error::{DispatchError, DispatchResult};

/// Kinds of explanation output an engine primitive can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExplainKind {
    /// Per-row attributions (spatial attention maps).
    Step,
    /// Per-model attributions (per-class feature-importance weights).
    Model,
    /// Per-prediction confidence intervals.
    Confidence,
}

struct ExplainPrimitive {
    primitive_id: &'static str,
    produce_method: &'static str,
    kind: ExplainKind,
}

/// Primitives with a known explain-capable produce method.
const EXPLAINABLE_PRIMITIVES: &[ExplainPrimitive] = &[
    ExplainPrimitive {
        primitive_id: "primitives.learner.random_forest",
        produce_method: "produce_feature_importances",
        kind: ExplainKind::Model,
    },
    ExplainPrimitive {
        primitive_id: "primitives.learner.gradient_boosting",
        produce_method: "produce_confidence_intervals",
        kind: ExplainKind::Confidence,
    },
    ExplainPrimitive {
        primitive_id: "primitives.vision.spatial_attention",
        produce_method: "produce_attention_maps",
        kind: ExplainKind::Step,
    },
];

fn lookup(primitive_id: &str) -> Option<&'static ExplainPrimitive> {
    EXPLAINABLE_PRIMITIVES
        .iter()
        .find(|p| p.primitive_id == primitive_id)
}

/// Where one explanation output lives in the augmented pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainOutput {
    /// Output key requested from produce, e.g. `outputs.1`.
    pub output_name: String,
    /// Index of the step exposing the output.
    pub step_index: usize,
    /// Step/output locator, e.g. `steps.2.produce_feature_importances`.
    pub locator: String,
}

/// An augmented pipeline plus its explanation output map.
#[derive(Debug, Clone)]
pub struct ExplainedPipeline {
    pub pipeline: PipelineDescription,
    pub outputs: HashMap<ExplainKind, ExplainOutput>,
}

impl ExplainedPipeline {
    fn not_explainable(pipeline: PipelineDescription) -> Self {
        Self {
            pipeline,
            outputs: HashMap::new(),
        }
    }

    pub fn explainable(&self) -> bool {
        !self.outputs.is_empty()
    }

    /// Output keys to request from produce, in addition to predictions.
    pub fn exposed_output_names(&self) -> Vec<String> {
        self.outputs.values().map(|o| o.output_name.clone()).collect()
    }
}

/// Rewrite a pipeline to expose explanation outputs.
///
/// Scans each step against the static primitive table; the first match
/// per explain kind gets an output reference appended to its step and to
/// the pipeline's output list. Returns the pipeline untouched with an
/// empty map when nothing matches or when the dataset is pooled
/// pre-featurized.
pub fn augment(pipeline: &PipelineDescription, pooled_features: bool) -> ExplainedPipeline {
    if pooled_features {
        return ExplainedPipeline::not_explainable(pipeline.clone());
    }

    let mut matches: Vec<(usize, &'static ExplainPrimitive)> = Vec::new();
    for (idx, step) in pipeline.steps.iter().enumerate() {
        if let Some(entry) = lookup(&step.primitive.id) {
            if matches.iter().any(|(_, m)| m.kind == entry.kind) {
                continue;
            }
            matches.push((idx, entry));
        }
    }

    if matches.is_empty() {
        return ExplainedPipeline::not_explainable(pipeline.clone());
    }

    let mut augmented = pipeline.clone();
    let mut outputs = HashMap::new();
    for (idx, entry) in matches {
        augmented.steps[idx]
            .outputs
            .push(entry.produce_method.to_string());
        let output_name = format!("outputs.{}", augmented.outputs.len());
        let locator = format!("steps.{}.{}", idx, entry.produce_method);
        augmented.outputs.push(OutputRef {
            name: output_name.clone(),
            data: locator.clone(),
        });
        outputs.insert(
            entry.kind,
            ExplainOutput {
                output_name,
                step_index: idx,
                locator,
            },
        );
    }

    ExplainedPipeline {
        pipeline: augmented,
        outputs,
    }
}

// ============================================================================
// Output parsing
// ============================================================================

/// Positional index joining decoded explanation rows back to their
/// source records, built from the original input's row order.
#[derive(Debug, Clone)]
pub struct RowIndex {
    keys: Vec<String>,
}

impl RowIndex {
    /// Read the key column of every row, in order.
    pub fn from_table(table: &TableData, key_col: usize) -> DispatchResult<Self> {
        if key_col >= table.header.len() {
            return Err(DispatchError::Explain(format!(
                "key column index {} out of bounds for {} columns",
                key_col,
                table.header.len()
            )));
        }
        let keys = table
            .rows
            .iter()
            .map(|row| row.get(key_col).cloned().unwrap_or_default())
            .collect();
        Ok(Self { keys })
    }

    /// Source-record key for a decoded row's position.
    pub fn record_for(&self, position: usize) -> Option<&str> {
        self.keys.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One decoded confidence interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceInterval {
    pub row: usize,
    pub low: f64,
    pub high: f64,
}

/// One class's feature-importance weights.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights {
    pub class: String,
    pub weights: Vec<f64>,
}

/// One row's spatial attention weights.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionRow {
    pub row: usize,
    pub weights: Vec<f64>,
}

fn parse_f64(raw: &str, what: &str) -> DispatchResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DispatchError::Explain(format!("unparseable {} value '{}'", what, raw)))
}

fn data_lines(raw: &str) -> impl Iterator<Item = &str> {
    // First line is the engine's header row.
    raw.lines().skip(1).filter(|l| !l.trim().is_empty())
}

/// Decode confidence intervals from the engine's raw CSV output
/// (`row,low,high` after a header line).
pub fn parse_confidence_intervals(raw: &str) -> DispatchResult<Vec<ConfidenceInterval>> {
    let mut out = Vec::new();
    for line in data_lines(raw) {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 3 {
            return Err(DispatchError::Explain(format!(
                "confidence row '{}' has {} fields, expected 3",
                line,
                fields.len()
            )));
        }
        out.push(ConfidenceInterval {
            row: fields[0].trim().parse().map_err(|_| {
                DispatchError::Explain(format!("unparseable row index '{}'", fields[0]))
            })?,
            low: parse_f64(fields[1], "confidence low")?,
            high: parse_f64(fields[2], "confidence high")?,
        });
    }
    Ok(out)
}

/// Decode per-class feature-importance weights
/// (`class,w0,w1,...` after a header line naming the features).
pub fn parse_feature_weights(raw: &str) -> DispatchResult<Vec<ClassWeights>> {
    let mut out = Vec::new();
    for line in data_lines(raw) {
        let mut fields = line.split(',');
        let class = fields
            .next()
            .ok_or_else(|| DispatchError::Explain("empty feature-weight row".to_string()))?
            .trim()
            .to_string();
        let weights = fields
            .map(|f| parse_f64(f, "feature weight"))
            .collect::<DispatchResult<Vec<f64>>>()?;
        out.push(ClassWeights { class, weights });
    }
    Ok(out)
}

/// Decode spatial attention maps (`row,w0,w1,...` after a header line).
pub fn parse_attention_maps(raw: &str) -> DispatchResult<Vec<AttentionRow>> {
    let mut out = Vec::new();
    for line in data_lines(raw) {
        let mut fields = line.split(',');
        let row = fields
            .next()
            .ok_or_else(|| DispatchError::Explain("empty attention row".to_string()))?
            .trim()
            .parse()
            .map_err(|_| DispatchError::Explain(format!("unparseable row index in '{}'", line)))?;
        let weights = fields
            .map(|f| parse_f64(f, "attention weight"))
            .collect::<DispatchResult<Vec<f64>>>()?;
        out.push(AttentionRow { row, weights });
    }
    Ok(out)
}
