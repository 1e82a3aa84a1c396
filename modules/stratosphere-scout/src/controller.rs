//! Collection loop controller. Owns one run at a time: repeated rounds of
//! adapter collection funneled serially through the dedup engine, then a
//! bounded-concurrency enrichment pass, resolving into a terminal state that
//! external callers can poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{error, info, warn};

use stratosphere_common::{Config, StratoError};
use stratosphere_engine::{IngestOutcome, Ingestor, LeadStore, Result};

use crate::adapters::SourceAdapter;
use crate::drafter::MessageDrafter;
use crate::enrich::ContactEnricher;
use crate::stats::RunStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    Initializing,
    Collecting,
    Enriching,
    Done,
    Stopped,
    Error,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Stopped | RunPhase::Error)
    }
}

/// Live snapshot of the current (or last) run. Updated after every candidate
/// ingested, so pollers never lag by more than one unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: Option<String>,
    pub phase: RunPhase,
    pub step: String,
    pub progress_pct: u8,
    pub total_scraped: u32,
    pub new_added: u32,
    pub duplicates_skipped: u32,
    pub merged_updates: u32,
    pub failed_ingestion: u32,
    pub loops: u32,
    pub enriched: u32,
    pub drafted: u32,
    pub retention_deleted: u64,
    /// True when a wall-clock timeout truncated the run ("done, partial").
    pub partial: bool,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            run_id: None,
            phase: RunPhase::Idle,
            step: "idle".to_string(),
            progress_pct: 0,
            total_scraped: 0,
            new_added: 0,
            duplicates_skipped: 0,
            merged_updates: 0,
            failed_ingestion: 0,
            loops: 0,
            enriched: 0,
            drafted: 0,
            retention_deleted: 0,
            partial: false,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target_new_leads: u32,
    pub max_loops: u32,
    pub stagnation_threshold: u32,
    pub duplicate_streak_threshold: u32,
    pub run_timeout: Duration,
    pub adapter_timeout: Duration,
    pub retention_days: i64,
    pub enrich_concurrency: usize,
}

impl From<&Config> for RunConfig {
    fn from(c: &Config) -> Self {
        Self {
            target_new_leads: c.target_new_leads,
            max_loops: c.max_loops,
            stagnation_threshold: c.stagnation_threshold,
            duplicate_streak_threshold: c.duplicate_streak_threshold,
            run_timeout: c.run_timeout,
            adapter_timeout: c.adapter_timeout,
            retention_days: c.retention_days,
            enrich_concurrency: c.enrich_concurrency,
        }
    }
}

pub struct Controller {
    store: Arc<dyn LeadStore>,
    ingestor: Ingestor,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    enricher: Arc<dyn ContactEnricher>,
    drafter: Arc<dyn MessageDrafter>,
    config: RunConfig,
    state: Arc<RwLock<RunState>>,
    busy: AtomicBool,
    stop: AtomicBool,
}

impl Controller {
    pub fn new(
        store: Arc<dyn LeadStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        enricher: Arc<dyn ContactEnricher>,
        drafter: Arc<dyn MessageDrafter>,
        config: RunConfig,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(store.clone()),
            store,
            adapters,
            enricher,
            drafter,
            config,
            state: Arc::new(RwLock::new(RunState::default())),
            busy: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    /// Current state snapshot for pollers.
    pub async fn state(&self) -> RunState {
        self.state.read().await.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Raise the stop signal. The in-flight candidate finishes; no new work
    /// is scheduled.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Execute one run. Rejects with `RunBusy` if a run is already active;
    /// any internal failure resolves into the `Error` phase rather than
    /// propagating, and the controller stays usable for the next trigger.
    pub async fn run(&self, run_id: Option<String>) -> Result<RunStats> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StratoError::RunBusy);
        }
        self.stop.store(false, Ordering::SeqCst);

        let run_id = run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let result = self.run_inner(&run_id).await;
        if let Err(e) = result {
            error!(run_id = run_id.as_str(), error = %e, "Run crashed");
            self.update_state(|s| {
                s.phase = RunPhase::Error;
                s.error = Some(e.to_string());
                s.step = "error".to_string();
                s.finished_at = Some(Utc::now());
            })
            .await;
        }
        self.busy.store(false, Ordering::SeqCst);

        let state = self.state().await;
        Ok(stats_from(&state))
    }

    async fn run_inner(&self, run_id: &str) -> Result<()> {
        let deadline = Instant::now() + self.config.run_timeout;
        info!(run_id, target = self.config.target_new_leads, "Run starting");

        self.update_state(|s| {
            *s = RunState {
                run_id: Some(run_id.to_string()),
                phase: RunPhase::Initializing,
                step: "initializing".to_string(),
                started_at: Some(Utc::now()),
                ..RunState::default()
            };
        })
        .await;

        // Retention sweep: anything older than the window is stale signal.
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        let deleted = self.store.delete_created_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "Retention sweep removed stale leads");
        }
        self.update_state(|s| s.retention_deleted = deleted).await;

        self.update_state(|s| {
            s.phase = RunPhase::Collecting;
            s.step = "collecting".to_string();
        })
        .await;

        let mut stagnant_rounds = 0u32;
        let mut streaks: HashMap<String, u32> = HashMap::new();
        let mut timed_out = false;

        'rounds: while self.state.read().await.loops < self.config.max_loops {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            let mut round_new = 0u32;
            for adapter in &self.adapters {
                if self.stop.load(Ordering::SeqCst) {
                    break;
                }
                if Instant::now() >= deadline {
                    timed_out = true;
                    break;
                }

                let name = adapter.name().to_string();
                self.update_state(|s| s.step = format!("collecting from {name}"))
                    .await;

                let candidates =
                    match tokio::time::timeout(self.config.adapter_timeout, adapter.collect())
                        .await
                    {
                        Ok(Ok(candidates)) => candidates,
                        Ok(Err(e)) => {
                            warn!(adapter = name.as_str(), error = %e, "Adapter failed, skipping for this round");
                            continue;
                        }
                        Err(_) => {
                            warn!(adapter = name.as_str(), "Adapter timed out, skipping for this round");
                            continue;
                        }
                    };

                for candidate in &candidates {
                    match self.ingestor.ingest(candidate, run_id).await {
                        Ok(IngestOutcome::Inserted(_)) => {
                            round_new += 1;
                            streaks.insert(name.clone(), 0);
                            self.update_state(|s| {
                                s.total_scraped += 1;
                                s.new_added += 1;
                                s.progress_pct = progress(s.new_added, self.config.target_new_leads);
                            })
                            .await;
                        }
                        Ok(IngestOutcome::Merged { updated, .. }) => {
                            *streaks.entry(name.clone()).or_insert(0) += 1;
                            self.update_state(|s| {
                                s.total_scraped += 1;
                                s.duplicates_skipped += 1;
                                if updated {
                                    s.merged_updates += 1;
                                }
                            })
                            .await;
                        }
                        Ok(IngestOutcome::Rejected { .. }) | Err(_) => {
                            self.update_state(|s| {
                                s.total_scraped += 1;
                                s.failed_ingestion += 1;
                            })
                            .await;
                        }
                    }

                    if self.state.read().await.new_added >= self.config.target_new_leads {
                        self.update_state(|s| s.loops += 1).await;
                        info!(run_id, "Target reached");
                        break 'rounds;
                    }
                    // Stop observed mid-batch: the in-flight candidate above
                    // finished, nothing further is scheduled.
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                }

                // Saturated keyword: rotate the adapter's schedule.
                let streak = streaks.get(&name).copied().unwrap_or(0);
                if streak >= self.config.duplicate_streak_threshold {
                    info!(adapter = name.as_str(), streak, "Duplicate streak, rotating");
                    if let Err(e) = adapter.rotate().await {
                        warn!(adapter = name.as_str(), error = %e, "Rotation failed");
                    }
                    streaks.insert(name, 0);
                }
            }

            self.update_state(|s| s.loops += 1).await;

            if round_new == 0 {
                stagnant_rounds += 1;
                info!(run_id, stagnant_rounds, "Round produced no new leads");
                if stagnant_rounds >= self.config.stagnation_threshold {
                    info!(run_id, "Stagnation threshold reached, collection saturated");
                    break;
                }
            } else {
                stagnant_rounds = 0;
            }
        }

        if self.stop.load(Ordering::SeqCst) {
            self.finish(RunPhase::Stopped, "stopped", false).await;
            info!(run_id, "Run stopped by request");
            return Ok(());
        }
        if timed_out {
            // Progress so far is already committed; mark it partial.
            self.finish(RunPhase::Done, "done (partial)", true).await;
            warn!(run_id, "Run hit wall-clock timeout, finishing partial");
            return Ok(());
        }

        self.update_state(|s| {
            s.phase = RunPhase::Enriching;
            s.step = "enriching".to_string();
        })
        .await;
        let enrich_timed_out = self.enrich_run(run_id, deadline).await?;

        if self.stop.load(Ordering::SeqCst) {
            self.finish(RunPhase::Stopped, "stopped", false).await;
        } else if enrich_timed_out {
            self.finish(RunPhase::Done, "done (partial)", true).await;
            warn!(run_id, "Run hit wall-clock timeout during enrichment, finishing partial");
        } else {
            self.finish(RunPhase::Done, "done", false).await;
        }
        info!(run_id, "Run finished");
        Ok(())
    }

    /// Enrich this run's leads with bounded concurrency. Each lead is
    /// independent; the store is the only shared resource. The wall-clock
    /// deadline still applies here: tasks past it are skipped, and the
    /// return value reports whether the ceiling was hit.
    async fn enrich_run(&self, run_id: &str, deadline: Instant) -> Result<bool> {
        let leads = self.store.leads_for_run(run_id).await?;
        let targets: Vec<_> = leads
            .into_iter()
            .filter(|l| l.domain.is_some() && (l.email.is_none() || l.telegram_url.is_none()))
            .collect();
        info!(count = targets.len(), "Enriching leads");

        let results = stream::iter(targets)
            .map(|lead| async move {
                if self.stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
                    return None;
                }
                let url = lead.domain.clone()?;
                let found = self.enricher.enrich(&url).await;
                match self.ingestor.apply_enrichment(lead, found).await {
                    Ok((lead, changed)) => Some((lead, changed)),
                    Err(e) => {
                        warn!(error = %e, "Enrichment apply failed");
                        None
                    }
                }
            })
            .buffer_unordered(self.config.enrich_concurrency)
            .collect::<Vec<_>>()
            .await;

        for result in results.into_iter().flatten() {
            let (mut lead, changed) = result;
            if changed {
                self.update_state(|s| s.enriched += 1).await;
            }
            if lead.icebreaker.is_none() {
                lead.icebreaker = Some(self.drafter.draft(&lead));
                self.store.update(&lead).await?;
                self.update_state(|s| s.drafted += 1).await;
            }
        }
        Ok(Instant::now() >= deadline)
    }

    async fn finish(&self, phase: RunPhase, step: &str, partial: bool) {
        self.update_state(|s| {
            s.phase = phase;
            s.step = step.to_string();
            s.partial = partial;
            if phase == RunPhase::Done && !partial {
                s.progress_pct = 100;
            }
            s.finished_at = Some(Utc::now());
        })
        .await;
    }

    async fn update_state(&self, f: impl FnOnce(&mut RunState)) {
        let mut state = self.state.write().await;
        f(&mut state);
    }
}

fn progress(added: u32, target: u32) -> u8 {
    if target == 0 {
        return 100;
    }
    ((added * 100 / target).min(100)) as u8
}

fn stats_from(state: &RunState) -> RunStats {
    RunStats {
        total_scraped: state.total_scraped,
        new_added: state.new_added,
        duplicates_skipped: state.duplicates_skipped,
        merged_updates: state.merged_updates,
        failed_ingestion: state.failed_ingestion,
        loops: state.loops,
        enriched: state.enriched,
        drafted: state.drafted,
        retention_deleted: state.retention_deleted,
    }
}
