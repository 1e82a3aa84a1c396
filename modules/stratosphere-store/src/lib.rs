//! Postgres persistence for leads, sightings, run logs, and rotation cursors.
//!
//! Implements the `LeadStore` seam the dedup engine depends on, plus the
//! query/stats surface the HTTP API serves from.

mod store;

pub use store::{LeadFilter, LeadStats, PgLeadStore, RunLogLine};
