//! High-intent announcement search over an HTML search frontend, with a
//! rotating keyword schedule. The rotation cursor is persisted through the
//! store so the next run resumes at the keyword where this one left off.

use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use stratosphere_common::{CandidateFacet, RawCandidate};
use stratosphere_engine::{LeadStore, Result};

use crate::backoff::BackoffPolicy;

use super::{fetch_text, http_client, SourceAdapter};

/// High-intent queries, one niche per entry. The cursor indexes into this.
const QUERY_SCHEDULE: &[&str] = &[
    r#"site:mirror.xyz "announcing our seed round""#,
    r#"site:medium.com "we are excited to announce" protocol"#,
    r#"site:x.com "raised" AND "pre-seed" -bitcoin"#,
    r#""mainnet launch" protocol incentivized"#,
    r#""token generation event" upcoming defi"#,
];

/// Queries issued per collection pass, starting at the cursor.
const QUERIES_PER_PASS: usize = 2;

pub struct AnnouncementSearchAdapter {
    client: reqwest::Client,
    store: Arc<dyn LeadStore>,
    policy: BackoffPolicy,
    anchor_re: Regex,
    href_re: Regex,
    tag_re: Regex,
    handle_re: Regex,
}

impl AnnouncementSearchAdapter {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self {
            client: http_client(),
            store,
            policy: BackoffPolicy::default(),
            anchor_re: Regex::new(r#"(?s)<a([^>]*result__a[^>]*)>(.*?)</a>"#).unwrap(),
            href_re: Regex::new(r#"href="([^"]+)""#).unwrap(),
            tag_re: Regex::new(r"<[^>]+>").unwrap(),
            handle_re: Regex::new(r"(?:twitter\.com|x\.com)/([A-Za-z0-9_]+)").unwrap(),
        }
    }

    fn parse_results(&self, html: &str, query: &str) -> Vec<RawCandidate> {
        let mut candidates = Vec::new();
        for anchor in self.anchor_re.captures_iter(html) {
            let Some(link) = self
                .href_re
                .captures(&anchor[1])
                .map(|c| c[1].to_string())
            else {
                continue;
            };
            let title = decode_entities(self.tag_re.replace_all(&anchor[2], "").trim());

            // "Announcing Monad: The ... | Mirror" -> "Announcing Monad"
            let name = title
                .split(':')
                .next()
                .unwrap_or_default()
                .split('|')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if name.len() <= 2 || name.len() > 30 {
                continue;
            }

            let mut candidate = RawCandidate::new(name, self.name());
            if link.contains("mirror.xyz") || link.contains("medium.com") {
                candidate
                    .facets
                    .push(CandidateFacet::AnnouncementUrl(link.clone()));
            } else if let Some(m) = self.handle_re.captures(&link) {
                candidate.social_handle = Some(m[1].to_string());
            }
            candidate.facets.push(CandidateFacet::SourceUrl(link));
            candidate
                .facets
                .push(CandidateFacet::Extra(format!("query={query}")));
            candidate
                .facets
                .push(CandidateFacet::IcebreakerSeed(title));
            candidates.push(candidate);
        }
        candidates
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
}

fn urlencode(q: &str) -> String {
    let mut out = String::with_capacity(q.len() * 3);
    for b in q.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[async_trait::async_trait]
impl SourceAdapter for AnnouncementSearchAdapter {
    fn name(&self) -> &str {
        "announcement_search"
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let cursor = self
            .store
            .get_rotation_cursor(self.name())
            .await?
            .unwrap_or(0) as usize;

        let mut candidates = Vec::new();
        for offset in 0..QUERIES_PER_PASS {
            let query = QUERY_SCHEDULE[(cursor + offset) % QUERY_SCHEDULE.len()];
            let url = format!(
                "https://html.duckduckgo.com/html/?q={}&kl=us-en",
                urlencode(query)
            );
            match fetch_text(&self.client, &url, &self.policy).await {
                Ok(html) => {
                    let found = self.parse_results(&html, query);
                    info!(query, results = found.len(), "Search pass finished");
                    candidates.extend(found);
                }
                Err(e) => {
                    warn!(query, error = %e, "Search query failed");
                }
            }
        }
        Ok(candidates)
    }

    /// Advance the persisted cursor one keyword forward.
    async fn rotate(&self) -> Result<()> {
        let cursor = self
            .store
            .get_rotation_cursor(self.name())
            .await?
            .unwrap_or(0);
        let next = (cursor + 1) % QUERY_SCHEDULE.len() as u32;
        self.store.set_rotation_cursor(self.name(), next).await?;
        info!(from = cursor, to = next, "Search keyword rotated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratosphere_engine::testing::MemoryLeadStore;

    fn adapter() -> AnnouncementSearchAdapter {
        AnnouncementSearchAdapter::new(Arc::new(MemoryLeadStore::new()))
    }

    const RESULT_HTML: &str = r#"
        <div class="result">
          <a rel="nofollow" class="result__a" href="https://mirror.xyz/acme/post">
            Announcing <b>Acme</b>: The Future of Testing | Mirror
          </a>
        </div>
        <div class="result">
          <a class="result__a" href="https://x.com/fooprotocol/status/1">Foo Protocol raised pre-seed</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://example.com/very-long">This headline is far too long to plausibly be a project name at all</a>
        </div>
    "#;

    #[test]
    fn parses_anchors_and_cleans_names() {
        let found = adapter().parse_results(RESULT_HTML, "q");
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].name, "Announcing Acme");
        assert!(found[0]
            .facets
            .iter()
            .any(|f| matches!(f, CandidateFacet::AnnouncementUrl(u) if u.contains("mirror.xyz"))));

        assert_eq!(found[1].name, "Foo Protocol raised pre-seed");
        assert_eq!(found[1].social_handle.as_deref(), Some("fooprotocol"));
    }

    #[test]
    fn overlong_titles_are_dropped() {
        let found = adapter().parse_results(RESULT_HTML, "q");
        assert!(found.iter().all(|c| c.name.len() <= 30));
    }

    #[tokio::test]
    async fn rotate_advances_and_wraps_cursor() {
        let store = Arc::new(MemoryLeadStore::new());
        let adapter = AnnouncementSearchAdapter::new(store.clone());
        for _ in 0..QUERY_SCHEDULE.len() {
            adapter.rotate().await.unwrap();
        }
        assert_eq!(
            store
                .get_rotation_cursor("announcement_search")
                .await
                .unwrap(),
            Some(0)
        );
    }

    #[test]
    fn urlencode_escapes_query_syntax() {
        assert_eq!(urlencode(r#"a "b" c"#), "a+%22b%22+c");
    }
}
