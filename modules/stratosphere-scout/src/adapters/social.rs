//! Social firehose via an actor-run dataset API. Raw post JSON arrives in
//! several historical shapes; field access goes through ordered extractor
//! chains so the first shape that matches wins and new shapes extend the
//! chain instead of forking the mapper.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use stratosphere_common::{CandidateFacet, RawCandidate, StratoError};
use stratosphere_engine::Result;

use crate::backoff::BackoffPolicy;

use super::{http_client, SourceAdapter};

const DEFAULT_API_URL: &str = "https://api.apify.com/v2";
const DEFAULT_ACTOR_ID: &str = "61RPP7dywgiy0JPD0";

const SEARCH_QUERIES: &[&str] = &[
    "launching (solana OR eth OR base) has:links",
    "new protocol (solana OR eth OR base) has:links",
    "AI Agent (launching OR live) has:links",
    "DePIN (launching OR roadmap) has:links",
];

pub struct SocialFirehoseAdapter {
    client: reqwest::Client,
    api_url: String,
    actor_id: String,
    api_token: String,
    policy: BackoffPolicy,
    telegram_re: Regex,
    url_re: Regex,
}

/// Try each path in order, returning the first non-empty string. A path that
/// misses a key falls through to the next one.
fn first_str<'a>(item: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    'paths: for path in paths {
        let mut node = item;
        for key in *path {
            match node.get(key) {
                Some(next) => node = next,
                None => continue 'paths,
            }
        }
        if let Some(s) = node.as_str() {
            if !s.is_empty() {
                return Some(s);
            }
        }
    }
    None
}

fn first_i64(item: &Value, paths: &[&[&str]]) -> i64 {
    for path in paths {
        let mut node = item;
        let mut found = true;
        for key in *path {
            match node.get(key) {
                Some(next) => node = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(n) = node.as_i64() {
                return n;
            }
        }
    }
    0
}

fn parse_post_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Twitter's legacy format: "Wed Oct 10 20:19:24 +0000 2018"
    DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl SocialFirehoseAdapter {
    pub fn new(api_token: &str) -> Self {
        Self::with_endpoint(api_token, DEFAULT_API_URL, DEFAULT_ACTOR_ID)
    }

    pub fn with_endpoint(api_token: &str, api_url: &str, actor_id: &str) -> Self {
        Self {
            client: http_client(),
            api_url: api_url.trim_end_matches('/').to_string(),
            actor_id: actor_id.to_string(),
            api_token: api_token.to_string(),
            policy: BackoffPolicy::default(),
            telegram_re: Regex::new(r"https?://(?:t\.me|telegram\.me)/[\w_]+").unwrap(),
            url_re: Regex::new(r"https?://[^\s]+").unwrap(),
        }
    }

    fn candidate_from_item(&self, item: &Value) -> Option<RawCandidate> {
        let username = first_str(
            item,
            &[&["author", "userName"], &["user", "screen_name"]],
        )?;
        let text = first_str(item, &[&["text"], &["fullText"], &["full_text"]])
            .unwrap_or_default()
            .to_string();

        let telegram = self
            .telegram_re
            .find(&text)
            .map(|m| m.as_str().to_string());
        // First plain link in the text that isn't the post platform itself.
        let website = self.url_re.find_iter(&text).find_map(|m| {
            let url = m.as_str().trim_end_matches(|c: char| ".,)".contains(c));
            if url.contains("t.me")
                || url.contains("telegram.me")
                || url.contains("twitter.com")
                || url.contains("x.com")
            {
                None
            } else {
                Some(url.to_string())
            }
        });

        let mut candidate = RawCandidate::new(format!("@{username}"), self.name());
        candidate.social_handle = Some(username.to_string());
        candidate.website = website;
        candidate.profile_image_url = first_str(
            item,
            &[
                &["author", "profileImageUrl"],
                &["user", "profile_image_url_https"],
            ],
        )
        .map(str::to_string);

        if let Some(tg) = telegram {
            candidate.facets.push(CandidateFacet::MessagingChannel(tg));
        }
        if !text.is_empty() {
            candidate
                .facets
                .push(CandidateFacet::Description(text.chars().take(500).collect()));
        }
        candidate.facets.push(CandidateFacet::Metrics {
            likes: first_i64(item, &[&["likeCount"], &["favorite_count"]]),
            replies: first_i64(item, &[&["replyCount"], &["reply_count"]]),
            reposts: first_i64(item, &[&["retweetCount"], &["retweet_count"]]),
        });
        if let Some(date) = first_str(item, &[&["createdAt"], &["created_at"]])
            .and_then(parse_post_date)
        {
            candidate.facets.push(CandidateFacet::LaunchDate(date));
        }
        if let Some(url) = first_str(item, &[&["url"], &["twitterUrl"]]) {
            candidate
                .facets
                .push(CandidateFacet::SourceUrl(url.to_string()));
        }

        let project_type = if text.to_lowercase().contains("depin") {
            "DePIN protocol"
        } else if text.to_lowercase().contains("ai") {
            "AI agent"
        } else {
            "project"
        };
        candidate.facets.push(CandidateFacet::IcebreakerSeed(format!(
            "Saw your {project_type} post on X. Open to partnerships?"
        )));

        Some(candidate)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for SocialFirehoseAdapter {
    fn name(&self) -> &str {
        "social_firehose"
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        if self.api_token.is_empty() {
            warn!("No actor API token configured, skipping social firehose");
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/acts/{}/run-sync-get-dataset-items?token={}",
            self.api_url, self.actor_id, self.api_token
        );
        let run_input = json!({
            "queries": SEARCH_QUERIES,
            "maxItems": 200,
            "sort": "Latest",
            "tweetLanguage": "en",
        });

        let mut attempt = 0;
        let items: Vec<Value> = loop {
            let result = self.client.post(&url).json(&run_input).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    break resp.json().await.map_err(|e| {
                        StratoError::Scraping(format!("firehose dataset decode: {e}"))
                    })?;
                }
                Ok(resp) if attempt >= self.policy.max_retries => {
                    return Err(StratoError::Scraping(format!(
                        "firehose actor returned {}",
                        resp.status()
                    )));
                }
                Err(e) if attempt >= self.policy.max_retries => {
                    return Err(StratoError::Scraping(format!("firehose actor: {e}")));
                }
                _ => {
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        };
        info!(items = items.len(), "Raw posts retrieved from firehose");

        Ok(items
            .iter()
            .filter_map(|item| self.candidate_from_item(item))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SocialFirehoseAdapter {
        SocialFirehoseAdapter::new("test-token")
    }

    #[test]
    fn maps_current_shape() {
        let item = json!({
            "text": "We are launching our DePIN network! https://acme.io and https://t.me/acmechat",
            "author": {"userName": "acme_xyz", "profileImageUrl": "https://img/acme.png"},
            "likeCount": 12,
            "replyCount": 3,
            "retweetCount": 4,
            "createdAt": "2025-06-01T10:00:00Z",
            "url": "https://x.com/acme_xyz/status/1"
        });
        let c = adapter().candidate_from_item(&item).unwrap();
        assert_eq!(c.name, "@acme_xyz");
        assert_eq!(c.social_handle.as_deref(), Some("acme_xyz"));
        assert_eq!(c.website.as_deref(), Some("https://acme.io"));
        assert_eq!(c.messaging_channel(), Some("https://t.me/acmechat"));
        assert!(c.icebreaker_seed().unwrap().contains("DePIN protocol"));
        assert_eq!(c.source_url(), Some("https://x.com/acme_xyz/status/1"));
    }

    #[test]
    fn falls_back_to_legacy_shape() {
        let item = json!({
            "fullText": "new protocol live",
            "user": {"screen_name": "legacy_user", "profile_image_url_https": "https://img/l.png"},
            "favorite_count": 7,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018"
        });
        let c = adapter().candidate_from_item(&item).unwrap();
        assert_eq!(c.social_handle.as_deref(), Some("legacy_user"));
        assert_eq!(c.description(), Some("new protocol live"));
        assert_eq!(
            c.profile_image_url.as_deref(),
            Some("https://img/l.png")
        );
        assert!(c.launch_date().is_some());
    }

    #[test]
    fn chain_skips_missed_paths_without_giving_up() {
        // "author" exists but the current-shape text key does not; the
        // chain must still reach the legacy "full_text" path.
        let item = json!({
            "author": {"userName": "mixed_user"},
            "full_text": "shipping soon"
        });
        let c = adapter().candidate_from_item(&item).unwrap();
        assert_eq!(c.social_handle.as_deref(), Some("mixed_user"));
        assert_eq!(c.description(), Some("shipping soon"));
    }

    #[test]
    fn item_without_username_is_dropped() {
        let item = json!({"text": "anonymous post"});
        assert!(adapter().candidate_from_item(&item).is_none());
    }

    #[test]
    fn platform_links_never_become_website() {
        let item = json!({
            "text": "check https://x.com/foo and https://t.me/foochat",
            "author": {"userName": "foo"}
        });
        let c = adapter().candidate_from_item(&item).unwrap();
        assert!(c.website.is_none());
    }
}
