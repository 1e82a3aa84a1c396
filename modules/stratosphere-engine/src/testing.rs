//! Deterministic in-memory `LeadStore` for tests. Enforces the same
//! uniqueness invariants as the Postgres store, including `DuplicateKey`
//! on insert races.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stratosphere_common::{Lead, NewLead, Sighting, StratoError};

use crate::traits::LeadStore;
use crate::Result;

#[derive(Default)]
struct Inner {
    leads: Vec<Lead>,
    sightings: Vec<Sighting>,
    cursors: HashMap<String, u32>,
    next_lead_id: i64,
    next_sighting_id: i64,
}

#[derive(Default)]
pub struct MemoryLeadStore {
    inner: Mutex<Inner>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_leads(&self) -> Vec<Lead> {
        self.inner.lock().unwrap().leads.clone()
    }

    pub fn sightings_for(&self, lead_id: i64) -> Vec<Sighting> {
        self.inner
            .lock()
            .unwrap()
            .sightings
            .iter()
            .filter(|s| s.lead_id == lead_id)
            .cloned()
            .collect()
    }
}

fn materialize(new: NewLead, id: i64, now: DateTime<Utc>) -> Lead {
    Lead {
        id,
        normalized_domain: new.normalized_domain,
        normalized_handle: new.normalized_handle,
        normalized_channel: new.normalized_channel,
        project_name: new.project_name,
        description: new.description,
        domain: new.domain,
        social_handle: new.social_handle,
        profile_image_url: new.profile_image_url,
        status: new.status,
        score: new.score,
        bucket: new.bucket,
        reject_reason: new.reject_reason,
        run_id: new.run_id,
        source_counts: new.source_counts,
        email: new.email,
        discord_url: new.discord_url,
        telegram_url: new.telegram_url,
        telegram_channel: new.telegram_channel,
        funding_info: new.funding_info,
        launch_date: new.launch_date,
        chains: new.chains,
        tags: new.tags,
        ai_analysis: new.ai_analysis,
        icebreaker: new.icebreaker,
        last_contacted_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Lead>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .leads
            .iter()
            .find(|l| l.normalized_domain.as_deref() == Some(domain))
            .cloned())
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Lead>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .leads
            .iter()
            .find(|l| l.normalized_handle.as_deref() == Some(handle))
            .cloned())
    }

    async fn find_by_channel(&self, channel: &str) -> Result<Option<Lead>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .leads
            .iter()
            .find(|l| l.normalized_channel.as_deref() == Some(channel))
            .cloned())
    }

    async fn insert(&self, lead: NewLead) -> Result<Lead> {
        let mut inner = self.inner.lock().unwrap();

        for (column, value) in [
            ("normalized_domain", &lead.normalized_domain),
            ("normalized_handle", &lead.normalized_handle),
            ("normalized_channel", &lead.normalized_channel),
        ] {
            if let Some(v) = value {
                let taken = match column {
                    "normalized_domain" => inner
                        .leads
                        .iter()
                        .any(|l| l.normalized_domain.as_deref() == Some(v)),
                    "normalized_handle" => inner
                        .leads
                        .iter()
                        .any(|l| l.normalized_handle.as_deref() == Some(v)),
                    _ => inner
                        .leads
                        .iter()
                        .any(|l| l.normalized_channel.as_deref() == Some(v)),
                };
                if taken {
                    return Err(StratoError::DuplicateKey {
                        column: column.to_string(),
                        value: v.clone(),
                    });
                }
            }
        }

        inner.next_lead_id += 1;
        let id = inner.next_lead_id;
        let stored = materialize(lead, id, Utc::now());
        inner.leads.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, lead: &Lead) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .leads
            .iter_mut()
            .find(|l| l.id == lead.id)
            .ok_or_else(|| StratoError::Database(format!("no lead with id {}", lead.id)))?;
        let mut updated = lead.clone();
        updated.updated_at = Utc::now();
        *slot = updated;
        Ok(())
    }

    async fn append_sighting(
        &self,
        lead_id: i64,
        source_name: &str,
        source_url: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_sighting_id += 1;
        let id = inner.next_sighting_id;
        inner.sightings.push(Sighting {
            id,
            lead_id,
            source_name: source_name.to_string(),
            source_url: source_url.map(str::to_string),
            discovered_at: Utc::now(),
        });
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().leads.len() as u64)
    }

    async fn count_for_run(&self, run_id: &str) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .leads
            .iter()
            .filter(|l| l.run_id.as_deref() == Some(run_id))
            .count() as u64)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.leads.len();
        inner.leads.retain(|l| l.created_at >= cutoff);
        Ok((before - inner.leads.len()) as u64)
    }

    async fn leads_for_run(&self, run_id: &str) -> Result<Vec<Lead>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .leads
            .iter()
            .filter(|l| l.run_id.as_deref() == Some(run_id))
            .cloned()
            .collect())
    }

    async fn get_rotation_cursor(&self, adapter: &str) -> Result<Option<u32>> {
        Ok(self.inner.lock().unwrap().cursors.get(adapter).copied())
    }

    async fn set_rotation_cursor(&self, adapter: &str, cursor: u32) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .cursors
            .insert(adapter.to_string(), cursor);
        Ok(())
    }
}
