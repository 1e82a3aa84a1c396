pub mod dedup;
pub mod normalize;
pub mod scoring;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dedup::{EnrichedFields, IngestOutcome, Ingestor, NormalizedKeys};
pub use normalize::{normalize_channel, normalize_domain, normalize_handle};
pub use scoring::{score_and_bucket, ScoreInputs, ScoreOutcome};
pub use traits::LeadStore;

pub type Result<T> = std::result::Result<T, stratosphere_common::StratoError>;
