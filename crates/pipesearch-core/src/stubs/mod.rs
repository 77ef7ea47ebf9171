//! In-memory stub implementations of the trait seams.
//!
//! # WARNING: TEST ONLY - DO NOT USE IN PRODUCTION
//!
//! All data is lost when the stub is dropped. Deployments wire a real
//! storage adapter behind [`SolutionStore`](crate::traits::SolutionStore).

mod solution_store_stub;

pub use solution_store_stub::{InMemorySolutionStore, SolutionResultRow};
