//! Deduplication and merge engine.
//!
//! Takes one raw candidate, computes its canonical identity keys, and decides
//! whether it is a brand-new lead, a sighting of an existing one, or noise.
//! Lookup order encodes trust ranking: messaging channel is the strongest
//! identity signal, then social handle, then domain.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use stratosphere_common::{Lead, NewLead, RawCandidate, StratoError};

use crate::normalize::{normalize_channel, normalize_domain, normalize_handle};
use crate::scoring::{score_and_bucket, ScoreInputs};
use crate::traits::LeadStore;
use crate::Result;

/// Canonical identity keys derived from one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedKeys {
    pub domain: Option<String>,
    pub handle: Option<String>,
    pub channel: Option<String>,
}

impl NormalizedKeys {
    pub fn from_candidate(raw: &RawCandidate) -> Self {
        Self {
            domain: raw.website.as_deref().and_then(normalize_domain),
            handle: raw.social_handle.as_deref().and_then(normalize_handle),
            channel: raw.messaging_channel().and_then(normalize_channel),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_none() && self.handle.is_none() && self.channel.is_none()
    }
}

/// What the engine did with one candidate.
#[derive(Debug)]
pub enum IngestOutcome {
    Inserted(Lead),
    /// Matched an existing lead. `updated` is false for pure duplicate
    /// sightings that changed nothing beyond the sighting count.
    Merged {
        lead: Lead,
        updated: bool,
    },
    Rejected {
        reason: String,
    },
}

/// Channel fields discovered by the enrichment collaborator. Applied through
/// the same fill-if-empty path as candidate merges.
#[derive(Debug, Clone, Default)]
pub struct EnrichedFields {
    pub email: Option<String>,
    pub telegram_url: Option<String>,
    pub discord_url: Option<String>,
    pub social_handle: Option<String>,
}

impl EnrichedFields {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.telegram_url.is_none()
            && self.discord_url.is_none()
            && self.social_handle.is_none()
    }
}

pub struct Ingestor {
    store: Arc<dyn LeadStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    /// Decide new-insert / merge / discard for one candidate.
    pub async fn ingest(&self, raw: &RawCandidate, run_id: &str) -> Result<IngestOutcome> {
        let keys = NormalizedKeys::from_candidate(raw);

        if let Some(existing) = self.find_match(&keys).await? {
            return self.merge(existing, raw, &keys).await;
        }

        // Admission floor: a candidate with no identity signal at all is
        // noise, never stored.
        if keys.is_empty() {
            debug!(name = raw.name.as_str(), source = raw.source.as_str(), "Candidate rejected: no identity signals");
            return Ok(IngestOutcome::Rejected {
                reason: "no identity signals".to_string(),
            });
        }

        let new_lead = build_new_lead(raw, &keys, run_id);
        match self.store.insert(new_lead).await {
            Ok(lead) => {
                self.store
                    .append_sighting(lead.id, &raw.source, raw.source_url())
                    .await?;
                info!(
                    lead_id = lead.id,
                    name = lead.project_name.as_str(),
                    bucket = ?lead.bucket,
                    "Lead inserted"
                );
                Ok(IngestOutcome::Inserted(lead))
            }
            Err(e) if e.is_duplicate_key() => {
                // Lost an insert race: a concurrent writer claimed one of our
                // keys mid-flight. Re-query and merge instead.
                warn!(name = raw.name.as_str(), error = %e, "Insert race, falling back to merge");
                match self.find_match(&keys).await? {
                    Some(existing) => self.merge(existing, raw, &keys).await,
                    None => Err(StratoError::Ingestion(format!(
                        "duplicate key reported for '{}' but no matching lead found",
                        raw.name
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Lookup in trust order: channel, then handle, then domain.
    async fn find_match(&self, keys: &NormalizedKeys) -> Result<Option<Lead>> {
        if let Some(channel) = &keys.channel {
            if let Some(lead) = self.store.find_by_channel(channel).await? {
                return Ok(Some(lead));
            }
        }
        if let Some(handle) = &keys.handle {
            if let Some(lead) = self.store.find_by_handle(handle).await? {
                return Ok(Some(lead));
            }
        }
        if let Some(domain) = &keys.domain {
            if let Some(lead) = self.store.find_by_domain(domain).await? {
                return Ok(Some(lead));
            }
        }
        Ok(None)
    }

    /// Merge a later sighting into an existing lead. The sighting is recorded
    /// unconditionally; descriptive fields fill in only where empty, and
    /// identity keys, once set, are never replaced.
    async fn merge(
        &self,
        mut lead: Lead,
        raw: &RawCandidate,
        keys: &NormalizedKeys,
    ) -> Result<IngestOutcome> {
        self.store
            .append_sighting(lead.id, &raw.source, raw.source_url())
            .await?;
        lead.source_counts += 1;

        let mut changed = false;

        // Identity keys. A candidate key already owned by a *different* lead
        // is a secondary match, informational only, left with its owner.
        if lead.normalized_domain.is_none() {
            if let Some(domain) = &keys.domain {
                if self.key_is_free(self.store.find_by_domain(domain).await?, lead.id) {
                    lead.normalized_domain = Some(domain.clone());
                    lead.domain = raw.website.clone();
                    changed = true;
                } else {
                    debug!(lead_id = lead.id, domain = domain.as_str(), "Secondary domain match, key stays with its owner");
                }
            }
        }
        if lead.normalized_handle.is_none() {
            if let Some(handle) = &keys.handle {
                if self.key_is_free(self.store.find_by_handle(handle).await?, lead.id) {
                    lead.normalized_handle = Some(handle.clone());
                    lead.social_handle = raw.social_handle.clone();
                    changed = true;
                } else {
                    debug!(lead_id = lead.id, handle = handle.as_str(), "Secondary handle match, key stays with its owner");
                }
            }
        }
        if lead.normalized_channel.is_none() {
            if let Some(channel) = &keys.channel {
                if self.key_is_free(self.store.find_by_channel(channel).await?, lead.id) {
                    lead.normalized_channel = Some(channel.clone());
                    lead.telegram_channel = raw.messaging_channel().map(str::to_string);
                    changed = true;
                } else {
                    debug!(lead_id = lead.id, channel = channel.as_str(), "Secondary channel match, key stays with its owner");
                }
            }
        }

        // Descriptive fields: first writer wins.
        changed |= fill(&mut lead.description, raw.description().map(str::to_string));
        changed |= fill(
            &mut lead.profile_image_url,
            raw.profile_image_url.clone(),
        );
        changed |= fill(&mut lead.funding_info, raw.funding().map(str::to_string));
        changed |= fill(&mut lead.icebreaker, raw.icebreaker_seed().map(str::to_string));
        if lead.launch_date.is_none() {
            if let Some(date) = raw.launch_date() {
                lead.launch_date = Some(date);
                changed = true;
            }
        }
        if lead.chains.is_empty() {
            if let Some(chains) = raw.chains() {
                if !chains.is_empty() {
                    lead.chains = chains.to_vec();
                    changed = true;
                }
            }
        }
        if lead.tags.is_empty() {
            if let Some(tags) = raw.tags() {
                if !tags.is_empty() {
                    lead.tags = tags.to_vec();
                    changed = true;
                }
            }
        }

        if changed {
            let outcome = score_and_bucket(&ScoreInputs::from_lead(&lead), Utc::now());
            lead.score = outcome.score;
            lead.bucket = Some(outcome.bucket);
            lead.status = outcome.status;
            lead.reject_reason = outcome.reject_reason;
        }

        self.store.update(&lead).await?;
        debug!(
            lead_id = lead.id,
            updated = changed,
            source = raw.source.as_str(),
            "Candidate merged into existing lead"
        );
        Ok(IngestOutcome::Merged { lead, updated: changed })
    }

    /// Apply enrichment results to a lead through the same fill-if-empty
    /// discipline as merges. Returns the stored lead and whether anything
    /// actually changed.
    pub async fn apply_enrichment(
        &self,
        mut lead: Lead,
        found: EnrichedFields,
    ) -> Result<(Lead, bool)> {
        let mut changed = false;

        changed |= fill(&mut lead.email, found.email);
        changed |= fill(&mut lead.discord_url, found.discord_url);

        if let Some(telegram) = found.telegram_url {
            if lead.telegram_url.is_none() {
                if lead.normalized_channel.is_none() {
                    if let Some(channel) = normalize_channel(&telegram) {
                        if self.key_is_free(self.store.find_by_channel(&channel).await?, lead.id) {
                            lead.normalized_channel = Some(channel);
                        }
                    }
                }
                lead.telegram_url = Some(telegram);
                changed = true;
            }
        }

        if let Some(handle) = found.social_handle {
            if lead.normalized_handle.is_none() {
                if let Some(normalized) = normalize_handle(&handle) {
                    if self.key_is_free(self.store.find_by_handle(&normalized).await?, lead.id) {
                        lead.normalized_handle = Some(normalized);
                        lead.social_handle = Some(handle);
                        changed = true;
                    }
                }
            }
        }

        if changed {
            let outcome = score_and_bucket(&ScoreInputs::from_lead(&lead), Utc::now());
            lead.score = outcome.score;
            lead.bucket = Some(outcome.bucket);
            lead.status = outcome.status;
            lead.reject_reason = outcome.reject_reason;
            self.store.update(&lead).await?;
        }

        Ok((lead, changed))
    }

    fn key_is_free(&self, owner: Option<Lead>, lead_id: i64) -> bool {
        match owner {
            None => true,
            Some(other) => other.id == lead_id,
        }
    }
}

/// Fill an empty slot, reporting whether it changed. Never overwrites.
fn fill(slot: &mut Option<String>, value: Option<String>) -> bool {
    if slot.is_none() {
        if let Some(v) = value {
            if !v.is_empty() {
                *slot = Some(v);
                return true;
            }
        }
    }
    false
}

fn build_new_lead(raw: &RawCandidate, keys: &NormalizedKeys, run_id: &str) -> NewLead {
    let mut lead = NewLead {
        normalized_domain: keys.domain.clone(),
        normalized_handle: keys.handle.clone(),
        normalized_channel: keys.channel.clone(),
        project_name: raw.name.clone(),
        description: raw.description().map(str::to_string),
        domain: raw.website.clone(),
        social_handle: raw.social_handle.clone(),
        profile_image_url: raw.profile_image_url.clone(),
        run_id: Some(run_id.to_string()),
        source_counts: 1,
        telegram_channel: raw.messaging_channel().map(str::to_string),
        funding_info: raw.funding().map(str::to_string),
        launch_date: raw.launch_date(),
        chains: raw.chains().map(<[String]>::to_vec).unwrap_or_default(),
        tags: raw.tags().map(<[String]>::to_vec).unwrap_or_default(),
        icebreaker: raw.icebreaker_seed().map(str::to_string),
        ..Default::default()
    };

    let outcome = score_and_bucket(&ScoreInputs::from_new(&lead), Utc::now());
    lead.score = outcome.score;
    lead.bucket = Some(outcome.bucket);
    lead.status = outcome.status;
    lead.reject_reason = outcome.reject_reason;
    lead
}
