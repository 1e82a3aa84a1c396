//! Collection side of the pipeline: source adapters, the run controller,
//! contact enrichment, and icebreaker drafting.

pub mod adapters;
pub mod backoff;
pub mod controller;
pub mod drafter;
pub mod enrich;
pub mod stats;

pub use backoff::BackoffPolicy;
pub use controller::{Controller, RunConfig, RunPhase, RunState};
pub use stats::RunStats;
