//! Pipesearch Dispatch
//!
//! The orchestration core: drives one search from submission to
//! completion, fanning out an independent concurrent lifecycle per
//! candidate solution the remote engine discovers, and rejoining them
//! all before the overall terminal status is delivered.
//!
//! Also home to the content-addressed [`PipelineCache`], the single-shot
//! [`SubmitPipeline`] façade built on top of it, and the explainability
//! augmentor that rewrites pipelines to expose explanation outputs.

pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod explain;
pub mod status;
pub mod submit;

pub use cache::{CacheStats, PipelineCache};
pub use dispatcher::{RequestHandle, SearchInputs, SolutionDispatcher};
pub use error::{DispatchError, DispatchResult};
pub use status::{StatusBus, StatusSubscription};
pub use submit::{SubmitPipeline, SubmitRequest};
