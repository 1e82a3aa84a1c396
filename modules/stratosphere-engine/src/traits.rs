// Store seam for the dedup engine and the collection loop.
//
// The engine depends on this trait, not on Postgres: the production
// implementation lives in stratosphere-store, and tests run against the
// in-memory store in `testing`: no network, no database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stratosphere_common::{Lead, NewLead};

use crate::Result;

#[async_trait]
pub trait LeadStore: Send + Sync {
    // --- Identity lookups (exact match on normalized key columns) ---

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Lead>>;
    async fn find_by_handle(&self, handle: &str) -> Result<Option<Lead>>;
    async fn find_by_channel(&self, channel: &str) -> Result<Option<Lead>>;

    // --- Writes ---

    /// Insert a new lead. Fails with `StratoError::DuplicateKey` if a
    /// concurrent insert already claimed one of the identity keys; callers
    /// treat that as "became a duplicate mid-flight" and fall back to merge.
    async fn insert(&self, lead: NewLead) -> Result<Lead>;

    /// Persist a mutated lead. Bumps `updated_at`.
    async fn update(&self, lead: &Lead) -> Result<()>;

    /// Record one source observation of a lead. Append-only.
    async fn append_sighting(
        &self,
        lead_id: i64,
        source_name: &str,
        source_url: Option<&str>,
    ) -> Result<()>;

    // --- Counters ---

    async fn count(&self) -> Result<u64>;
    async fn count_for_run(&self, run_id: &str) -> Result<u64>;

    // --- Run support ---

    /// Retention sweep: delete leads created before the cutoff. Returns the
    /// number deleted.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// All leads tagged with a run id, for the enrichment pass.
    async fn leads_for_run(&self, run_id: &str) -> Result<Vec<Lead>>;

    // --- Keyword rotation cursors (persisted across runs) ---

    async fn get_rotation_cursor(&self, adapter: &str) -> Result<Option<u32>>;
    async fn set_rotation_cursor(&self, adapter: &str, cursor: u32) -> Result<()>;
}
