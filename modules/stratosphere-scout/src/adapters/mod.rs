//! Source adapters. Each wraps one upstream shape (market-data API, HTML
//! search, social firehose) and turns it into `RawCandidate`s.
//!
//! Adapters catch their own transient errors: an ordinary "found nothing"
//! outcome is an empty Vec, and a failing upstream never aborts a round.

mod market_data;
mod search;
mod social;

pub use market_data::TrendingMarketAdapter;
pub use search::AnnouncementSearchAdapter;
pub use social::SocialFirehoseAdapter;

use async_trait::async_trait;
use tracing::warn;

use stratosphere_common::{RawCandidate, StratoError};
use stratosphere_engine::Result;

use crate::backoff::BackoffPolicy;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// One collection pass. Empty on "found nothing".
    async fn collect(&self) -> Result<Vec<RawCandidate>>;

    /// Advance to the next keyword/niche in the adapter's schedule. Called by
    /// the controller when the adapter's duplicate streak crosses the
    /// threshold. Default: nothing to rotate.
    async fn rotate(&self) -> Result<()> {
        Ok(())
    }
}

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(20))
        .build()
        .unwrap_or_default()
}

/// GET a URL as text, retrying per the backoff policy.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    policy: &BackoffPolicy,
) -> Result<String> {
    let mut attempt = 0;
    loop {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp
                    .text()
                    .await
                    .map_err(|e| StratoError::Scraping(format!("read body from {url}: {e}")));
            }
            Ok(resp) if attempt >= policy.max_retries => {
                return Err(StratoError::Scraping(format!(
                    "{url} returned {}",
                    resp.status()
                )));
            }
            Err(e) if attempt >= policy.max_retries => {
                return Err(StratoError::Scraping(format!("{url}: {e}")));
            }
            Ok(resp) => {
                warn!(url, status = %resp.status(), attempt, "Fetch failed, retrying");
            }
            Err(e) => {
                warn!(url, error = %e, attempt, "Fetch failed, retrying");
            }
        }
        tokio::time::sleep(policy.delay_for(attempt)).await;
        attempt += 1;
    }
}
