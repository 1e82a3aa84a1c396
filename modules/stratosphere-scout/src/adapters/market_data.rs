//! Trending list from a public market-data API, with a per-coin detail fetch
//! for the links that actually make a lead contactable (homepage, social
//! handle, telegram channel, genesis date).

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use stratosphere_common::{CandidateFacet, RawCandidate, StratoError};
use stratosphere_engine::Result;

use crate::backoff::BackoffPolicy;

use super::{fetch_text, http_client, SourceAdapter};

const DEFAULT_API_URL: &str = "https://api.coingecko.com/api/v3";
// Public API rate limit is tight; pace the detail fetches.
const DETAIL_FETCH_PAUSE: Duration = Duration::from_millis(1500);

pub struct TrendingMarketAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    policy: BackoffPolicy,
}

#[derive(Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    coins: Vec<TrendingEntry>,
}

#[derive(Deserialize)]
struct TrendingEntry {
    item: TrendingCoin,
}

#[derive(Deserialize)]
struct TrendingCoin {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct CoinDetail {
    name: Option<String>,
    genesis_date: Option<String>,
    #[serde(default)]
    description: CoinDescription,
    #[serde(default)]
    links: CoinLinks,
}

#[derive(Deserialize, Default)]
struct CoinDescription {
    en: Option<String>,
}

#[derive(Deserialize, Default)]
struct CoinLinks {
    twitter_screen_name: Option<String>,
    telegram_channel_identifier: Option<String>,
    #[serde(default)]
    homepage: Vec<String>,
}

impl TrendingMarketAdapter {
    /// An empty key stays on the anonymous public tier.
    pub fn new(api_key: &str) -> Self {
        Self::with_api_url(api_key, DEFAULT_API_URL)
    }

    pub fn with_api_url(api_key: &str, api_url: &str) -> Self {
        Self {
            client: http_client(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy: BackoffPolicy::default(),
        }
    }

    /// Append the API key query parameter when a key is configured.
    fn keyed(&self, url: String) -> String {
        if self.api_key.is_empty() {
            return url;
        }
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{url}{sep}x_cg_demo_api_key={}", self.api_key)
    }

    async fn fetch_detail(&self, coin_id: &str) -> Result<CoinDetail> {
        let url = self.keyed(format!(
            "{}/coins/{coin_id}?localization=false&tickers=false&market_data=false&community_data=true&developer_data=false",
            self.api_url
        ));
        let body = fetch_text(&self.client, &url, &self.policy).await?;
        serde_json::from_str(&body)
            .map_err(|e| StratoError::Scraping(format!("coin detail for {coin_id}: {e}")))
    }

    fn candidate_from_detail(&self, coin_id: &str, detail: CoinDetail, fallback_name: Option<String>) -> Option<RawCandidate> {
        let website = detail
            .links
            .homepage
            .iter()
            .find(|h| !h.is_empty())
            .cloned();
        let handle = detail
            .links
            .twitter_screen_name
            .filter(|h| !h.is_empty());
        // A trending entry with neither a site nor a handle is not reachable.
        if website.is_none() && handle.is_none() {
            return None;
        }

        let name = detail
            .name
            .or(fallback_name)
            .unwrap_or_else(|| coin_id.to_string());
        let mut candidate = RawCandidate::new(name, self.name());
        candidate.website = website;
        candidate.social_handle = handle;

        if let Some(desc) = detail.description.en.filter(|d| !d.is_empty()) {
            let truncated: String = desc.chars().take(500).collect();
            candidate.facets.push(CandidateFacet::Description(truncated));
        }
        if let Some(channel) = detail
            .links
            .telegram_channel_identifier
            .filter(|c| !c.is_empty())
        {
            candidate
                .facets
                .push(CandidateFacet::MessagingChannel(channel));
        }
        if let Some(date) = detail.genesis_date.as_deref().and_then(parse_genesis_date) {
            candidate.facets.push(CandidateFacet::LaunchDate(date));
        }
        candidate
            .facets
            .push(CandidateFacet::Extra(format!("coin_id={coin_id}")));
        Some(candidate)
    }
}

impl Default for TrendingMarketAdapter {
    fn default() -> Self {
        Self::new("")
    }
}

fn parse_genesis_date(s: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

#[async_trait::async_trait]
impl SourceAdapter for TrendingMarketAdapter {
    fn name(&self) -> &str {
        "trending_market"
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let url = self.keyed(format!("{}/search/trending", self.api_url));
        let body = fetch_text(&self.client, &url, &self.policy).await?;
        let trending: TrendingResponse = serde_json::from_str(&body)
            .map_err(|e| StratoError::Scraping(format!("trending response: {e}")))?;
        info!(coins = trending.coins.len(), "Trending coins fetched");

        let mut candidates = Vec::new();
        for entry in trending.coins {
            let Some(coin_id) = entry.item.id else {
                continue;
            };
            tokio::time::sleep(DETAIL_FETCH_PAUSE).await;
            match self.fetch_detail(&coin_id).await {
                Ok(detail) => {
                    if let Some(c) =
                        self.candidate_from_detail(&coin_id, detail, entry.item.name)
                    {
                        candidates.push(c);
                    } else {
                        debug!(coin_id, "Trending coin has no contact links, skipped");
                    }
                }
                Err(e) => {
                    // One unreachable coin detail never sinks the pass.
                    warn!(coin_id, error = %e, "Coin detail fetch failed");
                }
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_json(body: &str) -> CoinDetail {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn detail_with_links_becomes_candidate() {
        let adapter = TrendingMarketAdapter::new("");
        let detail = detail_json(
            r#"{
                "name": "Acme Chain",
                "genesis_date": "2025-05-01",
                "description": {"en": "A chain for acmes"},
                "links": {
                    "twitter_screen_name": "acmechain",
                    "telegram_channel_identifier": "acmechat",
                    "homepage": ["https://acme.io", ""]
                }
            }"#,
        );
        let c = adapter
            .candidate_from_detail("acme-chain", detail, None)
            .unwrap();
        assert_eq!(c.name, "Acme Chain");
        assert_eq!(c.website.as_deref(), Some("https://acme.io"));
        assert_eq!(c.social_handle.as_deref(), Some("acmechain"));
        assert_eq!(c.messaging_channel(), Some("acmechat"));
        assert_eq!(
            c.launch_date().unwrap().to_rfc3339(),
            "2025-05-01T00:00:00+00:00"
        );
    }

    #[test]
    fn detail_without_contacts_is_skipped() {
        let adapter = TrendingMarketAdapter::new("");
        let detail = detail_json(r#"{"name": "Ghost", "links": {"homepage": [""]}}"#);
        assert!(adapter.candidate_from_detail("ghost", detail, None).is_none());
    }

    #[test]
    fn missing_link_block_tolerated() {
        let adapter = TrendingMarketAdapter::new("");
        let detail = detail_json(r#"{"name": "Bare"}"#);
        assert!(adapter.candidate_from_detail("bare", detail, None).is_none());
    }

    #[test]
    fn api_key_rides_along_when_configured() {
        let keyless = TrendingMarketAdapter::new("");
        assert_eq!(
            keyless.keyed("https://api/search/trending".to_string()),
            "https://api/search/trending"
        );

        let keyed = TrendingMarketAdapter::new("k-123");
        assert_eq!(
            keyed.keyed("https://api/search/trending".to_string()),
            "https://api/search/trending?x_cg_demo_api_key=k-123"
        );
        assert_eq!(
            keyed.keyed("https://api/coins/acme?tickers=false".to_string()),
            "https://api/coins/acme?tickers=false&x_cg_demo_api_key=k-123"
        );
    }

    #[test]
    fn genesis_date_parses_or_none() {
        assert!(parse_genesis_date("2024-12-31").is_some());
        assert!(parse_genesis_date("not a date").is_none());
    }
}
