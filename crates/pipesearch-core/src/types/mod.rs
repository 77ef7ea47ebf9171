//! Domain types shared across the workspace.

mod pipeline;
mod request;
mod status;

pub use pipeline::{OutputRef, PipelineDescription, PipelineStep, PrimitiveRef};
pub use request::{Metric, SearchRequest, TaskType};
pub use status::{RequestState, SolutionState, StatusEvent, StatusState};
