use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Workflow enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LeadStatus {
    #[default]
    New,
    Enriched,
    Qualified,
    Disqualified,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::New => write!(f, "New"),
            LeadStatus::Enriched => write!(f, "Enriched"),
            LeadStatus::Qualified => write!(f, "Qualified"),
            LeadStatus::Disqualified => write!(f, "Disqualified"),
        }
    }
}

impl LeadStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "enriched" => LeadStatus::Enriched,
            "qualified" => LeadStatus::Qualified,
            "disqualified" => LeadStatus::Disqualified,
            _ => LeadStatus::New,
        }
    }
}

/// Outreach priority bucket assigned by the scoring policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bucket {
    ReadyToDm,
    NeedsAltOutreach,
    ManualCheck,
    UpcomingWatchlist,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bucket::ReadyToDm => write!(f, "READY_TO_DM"),
            Bucket::NeedsAltOutreach => write!(f, "NEEDS_ALT_OUTREACH"),
            Bucket::ManualCheck => write!(f, "MANUAL_CHECK"),
            Bucket::UpcomingWatchlist => write!(f, "UPCOMING_WATCHLIST"),
        }
    }
}

impl Bucket {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "READY_TO_DM" => Some(Bucket::ReadyToDm),
            "NEEDS_ALT_OUTREACH" => Some(Bucket::NeedsAltOutreach),
            "MANUAL_CHECK" => Some(Bucket::ManualCheck),
            "UPCOMING_WATCHLIST" => Some(Bucket::UpcomingWatchlist),
            _ => None,
        }
    }
}

// --- Raw candidates ---

/// One enrichment facet attached to a raw candidate. Adapters emit only the
/// facets they actually parsed; anything outside the modeled set goes into
/// `Extra` as an opaque string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "facet", rename_all = "snake_case")]
pub enum CandidateFacet {
    Description(String),
    MessagingChannel(String),
    LaunchDate(DateTime<Utc>),
    Chains(Vec<String>),
    Tags(Vec<String>),
    Funding(String),
    Metrics {
        likes: i64,
        replies: i64,
        reposts: i64,
    },
    AnnouncementUrl(String),
    /// The page/post the candidate was discovered on.
    SourceUrl(String),
    IcebreakerSeed(String),
    Extra(String),
}

/// An unvalidated record produced by one source adapter. Consumed immediately
/// by the normalizer + dedup engine, never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandidate {
    pub name: String,
    pub source: String,
    pub website: Option<String>,
    pub social_handle: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub facets: Vec<CandidateFacet>,
}

impl RawCandidate {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            website: None,
            social_handle: None,
            profile_image_url: None,
            facets: Vec::new(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::Description(d) => Some(d.as_str()),
            _ => None,
        })
    }

    pub fn messaging_channel(&self) -> Option<&str> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::MessagingChannel(c) => Some(c.as_str()),
            _ => None,
        })
    }

    pub fn launch_date(&self) -> Option<DateTime<Utc>> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::LaunchDate(d) => Some(*d),
            _ => None,
        })
    }

    pub fn chains(&self) -> Option<&[String]> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::Chains(c) => Some(c.as_slice()),
            _ => None,
        })
    }

    pub fn tags(&self) -> Option<&[String]> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::Tags(t) => Some(t.as_slice()),
            _ => None,
        })
    }

    pub fn funding(&self) -> Option<&str> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::Funding(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn source_url(&self) -> Option<&str> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::SourceUrl(u) => Some(u.as_str()),
            _ => None,
        })
    }

    pub fn icebreaker_seed(&self) -> Option<&str> {
        self.facets.iter().find_map(|f| match f {
            CandidateFacet::IcebreakerSeed(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

// --- Leads ---

/// A canonical, deduplicated project/contact. Identity is enforced by the
/// store through the three nullable-unique normalized key columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,

    // Identity keys (unique when present)
    pub normalized_domain: Option<String>,
    pub normalized_handle: Option<String>,
    pub normalized_channel: Option<String>,

    // Descriptive
    pub project_name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub social_handle: Option<String>,
    pub profile_image_url: Option<String>,

    // Workflow
    pub status: LeadStatus,
    pub score: i32,
    pub bucket: Option<Bucket>,
    pub reject_reason: Option<String>,

    // Provenance
    pub run_id: Option<String>,
    pub source_counts: i32,

    // Enrichment
    pub email: Option<String>,
    pub discord_url: Option<String>,
    pub telegram_url: Option<String>,
    pub telegram_channel: Option<String>,
    pub funding_info: Option<String>,
    pub launch_date: Option<DateTime<Utc>>,
    pub chains: Vec<String>,
    pub tags: Vec<String>,
    pub ai_analysis: Option<String>,
    pub icebreaker: Option<String>,

    pub last_contacted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// True if any of the three identity keys is set.
    pub fn has_identity(&self) -> bool {
        self.normalized_domain.is_some()
            || self.normalized_handle.is_some()
            || self.normalized_channel.is_some()
    }
}

/// Field set for creating a new lead. The store assigns id and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub normalized_domain: Option<String>,
    pub normalized_handle: Option<String>,
    pub normalized_channel: Option<String>,
    pub project_name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub social_handle: Option<String>,
    pub profile_image_url: Option<String>,
    pub status: LeadStatus,
    pub score: i32,
    pub bucket: Option<Bucket>,
    pub reject_reason: Option<String>,
    pub run_id: Option<String>,
    pub source_counts: i32,
    pub email: Option<String>,
    pub discord_url: Option<String>,
    pub telegram_url: Option<String>,
    pub telegram_channel: Option<String>,
    pub funding_info: Option<String>,
    pub launch_date: Option<DateTime<Utc>>,
    pub chains: Vec<String>,
    pub tags: Vec<String>,
    pub ai_analysis: Option<String>,
    pub icebreaker: Option<String>,
}

/// One observation of a lead by one source. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sighting {
    pub id: i64,
    pub lead_id: i64,
    pub source_name: String,
    pub source_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_serializes_screaming_snake() {
        let json = serde_json::to_string(&Bucket::ReadyToDm).unwrap();
        assert_eq!(json, "\"READY_TO_DM\"");
        let json = serde_json::to_string(&Bucket::UpcomingWatchlist).unwrap();
        assert_eq!(json, "\"UPCOMING_WATCHLIST\"");
    }

    #[test]
    fn bucket_round_trips_from_str_loose() {
        for b in [
            Bucket::ReadyToDm,
            Bucket::NeedsAltOutreach,
            Bucket::ManualCheck,
            Bucket::UpcomingWatchlist,
        ] {
            assert_eq!(Bucket::from_str_loose(&b.to_string()), Some(b));
        }
        assert_eq!(Bucket::from_str_loose("whatever"), None);
    }

    #[test]
    fn status_from_str_loose_defaults_to_new() {
        assert_eq!(LeadStatus::from_str_loose("qualified"), LeadStatus::Qualified);
        assert_eq!(LeadStatus::from_str_loose("garbage"), LeadStatus::New);
    }

    #[test]
    fn facet_accessors_find_first_match() {
        let mut c = RawCandidate::new("Acme", "test");
        c.facets.push(CandidateFacet::Description("a defi thing".into()));
        c.facets.push(CandidateFacet::MessagingChannel("t.me/acme".into()));
        assert_eq!(c.description(), Some("a defi thing"));
        assert_eq!(c.messaging_channel(), Some("t.me/acme"));
        assert!(c.launch_date().is_none());
    }
}
