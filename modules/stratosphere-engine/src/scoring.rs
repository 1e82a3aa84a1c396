//! Scoring and bucketing policy.
//!
//! Pure function of the lead's enrichment state and the caller-supplied
//! clock. Re-invoked whenever a merge or enrichment actually changes a field,
//! never on pure duplicate sightings.

use chrono::{DateTime, Duration, Utc};

use stratosphere_common::{Bucket, Lead, LeadStatus, NewLead};

/// The enrichment presence signals the policy consults.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs {
    pub has_domain: bool,
    pub has_handle: bool,
    pub has_channel: bool,
    pub has_email: bool,
    pub launch_date: Option<DateTime<Utc>>,
}

impl ScoreInputs {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            has_domain: lead.domain.is_some() || lead.normalized_domain.is_some(),
            has_handle: lead.social_handle.is_some() || lead.normalized_handle.is_some(),
            has_channel: lead.telegram_channel.is_some()
                || lead.telegram_url.is_some()
                || lead.normalized_channel.is_some(),
            has_email: lead.email.is_some(),
            launch_date: lead.launch_date,
        }
    }

    pub fn from_new(lead: &NewLead) -> Self {
        Self {
            has_domain: lead.domain.is_some() || lead.normalized_domain.is_some(),
            has_handle: lead.social_handle.is_some() || lead.normalized_handle.is_some(),
            has_channel: lead.telegram_channel.is_some()
                || lead.telegram_url.is_some()
                || lead.normalized_channel.is_some(),
            has_email: lead.email.is_some(),
            launch_date: lead.launch_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: i32,
    pub bucket: Bucket,
    pub status: LeadStatus,
    pub reject_reason: Option<String>,
}

/// Additive point schedule, capped at 100, plus the bucket ladder
/// (first match wins).
pub fn score_and_bucket(inputs: &ScoreInputs, now: DateTime<Utc>) -> ScoreOutcome {
    let mut score = 0;
    if inputs.has_domain {
        score += 30;
    }
    if inputs.has_handle {
        score += 40;
    }
    if inputs.has_channel {
        // Channel-first ingestion: a messaging channel that is the lead's
        // only identity signal carries extra weight.
        score += if !inputs.has_domain && !inputs.has_handle {
            30
        } else {
            20
        };
    }
    if inputs.has_email {
        score += 10;
    }

    let launch_in_future = inputs.launch_date.map(|d| d > now).unwrap_or(false);
    let fresh = inputs
        .launch_date
        .map(|d| d > now || now - d <= Duration::days(7))
        .unwrap_or(false);
    if fresh {
        score += 10;
    }
    let score = score.min(100);

    let (bucket, status) = if inputs.has_domain && inputs.has_handle {
        (Bucket::ReadyToDm, LeadStatus::Qualified)
    } else if inputs.has_domain {
        (Bucket::NeedsAltOutreach, LeadStatus::Qualified)
    } else if launch_in_future {
        (Bucket::UpcomingWatchlist, LeadStatus::Enriched)
    } else {
        (Bucket::ManualCheck, LeadStatus::Enriched)
    };

    // Note missing outreach channels without blocking bucket assignment.
    let mut reasons = Vec::new();
    if !inputs.has_handle {
        reasons.push("Missing X");
    }
    if !inputs.has_domain {
        reasons.push("Missing website");
    }
    let reject_reason = if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(", "))
    };

    ScoreOutcome {
        score,
        bucket,
        status,
        reject_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2025-06-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn domain_only_is_needs_alt_outreach_at_30() {
        let out = score_and_bucket(
            &ScoreInputs {
                has_domain: true,
                ..Default::default()
            },
            now(),
        );
        assert_eq!(out.score, 30);
        assert_eq!(out.bucket, Bucket::NeedsAltOutreach);
        assert_eq!(out.status, LeadStatus::Qualified);
        assert_eq!(out.reject_reason.as_deref(), Some("Missing X"));
    }

    #[test]
    fn domain_and_handle_is_ready_to_dm_at_70() {
        let out = score_and_bucket(
            &ScoreInputs {
                has_domain: true,
                has_handle: true,
                ..Default::default()
            },
            now(),
        );
        assert_eq!(out.score, 70);
        assert_eq!(out.bucket, Bucket::ReadyToDm);
        assert_eq!(out.status, LeadStatus::Qualified);
        assert!(out.reject_reason.is_none());
    }

    #[test]
    fn channel_alone_scores_30_not_20() {
        let out = score_and_bucket(
            &ScoreInputs {
                has_channel: true,
                ..Default::default()
            },
            now(),
        );
        assert_eq!(out.score, 30);
        assert_eq!(out.bucket, Bucket::ManualCheck);
        assert_eq!(out.status, LeadStatus::Enriched);
    }

    #[test]
    fn channel_alongside_other_signals_scores_20() {
        let out = score_and_bucket(
            &ScoreInputs {
                has_domain: true,
                has_handle: true,
                has_channel: true,
                has_email: true,
                ..Default::default()
            },
            now(),
        );
        assert_eq!(out.score, 100);
    }

    #[test]
    fn score_caps_at_100() {
        let out = score_and_bucket(
            &ScoreInputs {
                has_domain: true,
                has_handle: true,
                has_channel: true,
                has_email: true,
                launch_date: Some(now() + Duration::days(3)),
            },
            now(),
        );
        assert_eq!(out.score, 100);
    }

    #[test]
    fn future_launch_without_contacts_is_watchlist() {
        let out = score_and_bucket(
            &ScoreInputs {
                launch_date: Some(now() + Duration::days(14)),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(out.bucket, Bucket::UpcomingWatchlist);
        assert_eq!(out.score, 10);
    }

    #[test]
    fn recent_launch_gets_freshness_bonus_but_not_watchlist() {
        let out = score_and_bucket(
            &ScoreInputs {
                has_domain: true,
                launch_date: Some(now() - Duration::days(3)),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(out.score, 40);
        assert_eq!(out.bucket, Bucket::NeedsAltOutreach);
    }

    #[test]
    fn stale_launch_gets_no_bonus() {
        let out = score_and_bucket(
            &ScoreInputs {
                has_domain: true,
                launch_date: Some(now() - Duration::days(30)),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(out.score, 30);
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let inputs = ScoreInputs {
            has_domain: true,
            has_channel: true,
            launch_date: Some(now() - Duration::days(2)),
            ..Default::default()
        };
        let first = score_and_bucket(&inputs, now());
        for _ in 0..10 {
            assert_eq!(score_and_bucket(&inputs, now()), first);
        }
    }
}
