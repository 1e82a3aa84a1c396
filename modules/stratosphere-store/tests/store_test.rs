//! Integration tests for PgLeadStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use stratosphere_common::{Bucket, LeadStatus, NewLead};
use stratosphere_engine::LeadStore;
use stratosphere_store::{LeadFilter, PgLeadStore};

/// Get a migrated, truncated test store, or skip if no test DB is available.
async fn test_store() -> Option<PgLeadStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = PgLeadStore::connect(&url).await.ok()?;
    store.migrate().await.ok()?;
    sqlx::query("TRUNCATE leads, lead_sources, run_logs, rotation_cursors RESTART IDENTITY CASCADE")
        .execute(store.pool())
        .await
        .ok()?;
    Some(store)
}

fn new_lead(name: &str, domain: Option<&str>, handle: Option<&str>) -> NewLead {
    NewLead {
        normalized_domain: domain.map(str::to_string),
        normalized_handle: handle.map(str::to_string),
        project_name: name.to_string(),
        domain: domain.map(|d| format!("https://{d}")),
        status: LeadStatus::Qualified,
        score: 30,
        bucket: Some(Bucket::NeedsAltOutreach),
        run_id: Some("run-1".to_string()),
        source_counts: 1,
        ..Default::default()
    }
}

// =========================================================================
// Insert and lookups
// =========================================================================

#[tokio::test]
async fn insert_then_find_by_each_key() {
    let Some(store) = test_store().await else {
        return;
    };

    let lead = store
        .insert(new_lead("Acme", Some("acme.io"), Some("acme")))
        .await
        .unwrap();
    assert!(lead.id > 0);
    assert_eq!(lead.status, LeadStatus::Qualified);
    assert_eq!(lead.bucket, Some(Bucket::NeedsAltOutreach));

    let by_domain = store.find_by_domain("acme.io").await.unwrap().unwrap();
    assert_eq!(by_domain.id, lead.id);
    let by_handle = store.find_by_handle("acme").await.unwrap().unwrap();
    assert_eq!(by_handle.id, lead.id);
    assert!(store.find_by_domain("other.io").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_identity_key_maps_to_typed_error() {
    let Some(store) = test_store().await else {
        return;
    };

    store
        .insert(new_lead("Acme", Some("acme.io"), None))
        .await
        .unwrap();
    let err = store
        .insert(new_lead("Acme Again", Some("acme.io"), None))
        .await
        .unwrap_err();
    assert!(err.is_duplicate_key(), "got {err}");
}

#[tokio::test]
async fn two_null_domains_do_not_collide() {
    let Some(store) = test_store().await else {
        return;
    };

    store.insert(new_lead("A", None, Some("a"))).await.unwrap();
    store.insert(new_lead("B", None, Some("b"))).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
}

// =========================================================================
// Update and round-trip fidelity
// =========================================================================

#[tokio::test]
async fn update_persists_enrichment_and_lists() {
    let Some(store) = test_store().await else {
        return;
    };

    let mut lead = store
        .insert(new_lead("Acme", Some("acme.io"), None))
        .await
        .unwrap();
    lead.email = Some("team@acme.io".to_string());
    lead.chains = vec!["ethereum".to_string(), "base".to_string()];
    lead.tags = vec!["defi".to_string()];
    lead.score = 40;
    store.update(&lead).await.unwrap();

    let stored = store.find_by_domain("acme.io").await.unwrap().unwrap();
    assert_eq!(stored.email.as_deref(), Some("team@acme.io"));
    assert_eq!(stored.chains, vec!["ethereum", "base"]);
    assert_eq!(stored.tags, vec!["defi"]);
    assert!(stored.updated_at >= lead.updated_at);
}

// =========================================================================
// Sightings, runs, retention
// =========================================================================

#[tokio::test]
async fn sightings_append_and_run_counts() {
    let Some(store) = test_store().await else {
        return;
    };

    let lead = store
        .insert(new_lead("Acme", Some("acme.io"), None))
        .await
        .unwrap();
    store
        .append_sighting(lead.id, "trending_market", Some("https://example.com/p"))
        .await
        .unwrap();
    store
        .append_sighting(lead.id, "announcement_search", None)
        .await
        .unwrap();

    assert_eq!(store.count_for_run("run-1").await.unwrap(), 1);
    assert_eq!(store.count_for_run("run-2").await.unwrap(), 0);
    let for_run = store.leads_for_run("run-1").await.unwrap();
    assert_eq!(for_run.len(), 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert!(stats
        .by_source
        .iter()
        .any(|(name, n)| name == "trending_market" && *n == 1));
}

#[tokio::test]
async fn retention_sweep_deletes_old_rows() {
    let Some(store) = test_store().await else {
        return;
    };

    store
        .insert(new_lead("Fresh", Some("fresh.io"), None))
        .await
        .unwrap();
    // Nothing is older than now minus a day.
    let deleted = store
        .delete_created_before(chrono::Utc::now() - chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
    // Everything is older than a future cutoff.
    let deleted = store
        .delete_created_before(chrono::Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
}

// =========================================================================
// API query surface
// =========================================================================

#[tokio::test]
async fn query_filters_by_bucket_and_paginates() {
    let Some(store) = test_store().await else {
        return;
    };

    for i in 0..5 {
        store
            .insert(new_lead(&format!("P{i}"), Some(&format!("p{i}.io")), None))
            .await
            .unwrap();
    }
    let mut watch = new_lead("W", Some("w.io"), None);
    watch.bucket = Some(Bucket::UpcomingWatchlist);
    store.insert(watch).await.unwrap();

    let page = store
        .query(&LeadFilter {
            bucket: Some(Bucket::NeedsAltOutreach),
            limit: 3,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 3);
    assert!(page
        .iter()
        .all(|l| l.bucket == Some(Bucket::NeedsAltOutreach)));

    let rest = store
        .query(&LeadFilter {
            bucket: Some(Bucket::NeedsAltOutreach),
            skip: 3,
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
}

#[tokio::test]
async fn set_status_bucket_updates_only_given_fields() {
    let Some(store) = test_store().await else {
        return;
    };

    let lead = store
        .insert(new_lead("Acme", Some("acme.io"), None))
        .await
        .unwrap();
    let updated = store
        .set_status_bucket(lead.id, Some(LeadStatus::Disqualified), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, LeadStatus::Disqualified);
    assert_eq!(updated.bucket, Some(Bucket::NeedsAltOutreach));

    assert!(store
        .set_status_bucket(999_999, Some(LeadStatus::New), None)
        .await
        .unwrap()
        .is_none());
}

// =========================================================================
// Rotation cursors and run logs
// =========================================================================

#[tokio::test]
async fn rotation_cursor_upserts() {
    let Some(store) = test_store().await else {
        return;
    };

    assert!(store
        .get_rotation_cursor("announcement_search")
        .await
        .unwrap()
        .is_none());
    store.set_rotation_cursor("announcement_search", 2).await.unwrap();
    store.set_rotation_cursor("announcement_search", 3).await.unwrap();
    assert_eq!(
        store.get_rotation_cursor("announcement_search").await.unwrap(),
        Some(3)
    );
}

#[tokio::test]
async fn run_logs_are_recorded_and_listed() {
    let Some(store) = test_store().await else {
        return;
    };

    let lead = store
        .insert(new_lead("Acme", Some("acme.io"), None))
        .await
        .unwrap();

    store.log_line("run-9", None, "scout", "info", "round 1 finished").await;
    store.log_line("run-9", None, "scout", "warn", "adapter timed out").await;
    store
        .log_line("run-9", Some(lead.id), "scout", "info", "lead enriched")
        .await;
    store.log_line("run-9", None, "api", "info", "run triggered").await;
    let logs = store.recent_logs("run-9", 10).await.unwrap();
    assert_eq!(logs.len(), 4);
    assert_eq!(logs[0].component, "api");
    assert_eq!(logs[1].lead_id, Some(lead.id));
    assert_eq!(logs[2].message, "adapter timed out");
    assert_eq!(logs[2].lead_id, None);
}
