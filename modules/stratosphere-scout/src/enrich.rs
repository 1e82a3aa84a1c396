//! Contact enrichment: visit a lead's website and pull out the channels we
//! can actually reach them on.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use stratosphere_engine::EnrichedFields;

use crate::adapters::http_client;

/// Channel fields discovered on a page. Empty on any failure; enrichment
/// never errors.
pub type ContactInfo = EnrichedFields;

#[async_trait]
pub trait ContactEnricher: Send + Sync {
    async fn enrich(&self, url: &str) -> ContactInfo;
}

pub struct HttpEnricher {
    client: reqwest::Client,
    timeout: Duration,
    href_re: Regex,
    email_re: Regex,
}

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

impl HttpEnricher {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            timeout: Duration::from_secs(10),
            href_re: Regex::new(r#"href="([^"]+)""#).unwrap(),
            email_re: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap(),
        }
    }

    fn parse_html(&self, html: &str) -> ContactInfo {
        let mut info = ContactInfo::default();

        for cap in self.href_re.captures_iter(html) {
            let href = &cap[1];

            if let Some(rest) = href.strip_prefix("mailto:") {
                if info.email.is_none() {
                    let addr = rest.split('?').next().unwrap_or_default().trim();
                    if !addr.is_empty() {
                        info.email = Some(addr.to_string());
                    }
                }
            }

            if (href.contains("t.me/") || href.contains("telegram.me/"))
                && !href.contains("joinchat")
                && info.telegram_url.is_none()
            {
                info.telegram_url = Some(href.to_string());
            }

            if (href.contains("discord.gg/") || href.contains("discord.com/invite/"))
                && info.discord_url.is_none()
            {
                info.discord_url = Some(href.to_string());
            }

            if (href.contains("twitter.com/") || href.contains("x.com/"))
                && !href.contains("/status/")
                && !href.contains("intent")
                && info.social_handle.is_none()
            {
                let handle = href
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .split('?')
                    .next()
                    .unwrap_or_default();
                if !handle.is_empty() {
                    info.social_handle = Some(handle.to_string());
                }
            }
        }

        // Text fallback for emails, filtering asset filenames that match the
        // pattern (image@2x.png and friends).
        if info.email.is_none() {
            info.email = self
                .email_re
                .find_iter(html)
                .map(|m| m.as_str())
                .find(|e| {
                    let lower = e.to_lowercase();
                    !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
                })
                .map(str::to_string);
        }

        info
    }
}

impl Default for HttpEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContactEnricher for HttpEnricher {
    async fn enrich(&self, url: &str) -> ContactInfo {
        if !url.contains("http") {
            return ContactInfo::default();
        }
        debug!(url, "Enriching");
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send()).await;
        let html = match response {
            Ok(Ok(resp)) if resp.status().is_success() => match resp.text().await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url, error = %e, "Enrichment body read failed");
                    return ContactInfo::default();
                }
            },
            Ok(Ok(resp)) => {
                debug!(url, status = %resp.status(), "Enrichment fetch non-success");
                return ContactInfo::default();
            }
            Ok(Err(e)) => {
                warn!(url, error = %e, "Enrichment fetch failed");
                return ContactInfo::default();
            }
            Err(_) => {
                warn!(url, "Enrichment fetch timed out");
                return ContactInfo::default();
            }
        };
        self.parse_html(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_channel_links() {
        let html = r#"
            <a href="mailto:team@acme.io?subject=hi">Contact</a>
            <a href="https://t.me/acmechat">Telegram</a>
            <a href="https://discord.gg/acme">Discord</a>
            <a href="https://x.com/acmeproject">Follow us</a>
        "#;
        let info = HttpEnricher::new().parse_html(html);
        assert_eq!(info.email.as_deref(), Some("team@acme.io"));
        assert_eq!(info.telegram_url.as_deref(), Some("https://t.me/acmechat"));
        assert_eq!(info.discord_url.as_deref(), Some("https://discord.gg/acme"));
        assert_eq!(info.social_handle.as_deref(), Some("acmeproject"));
    }

    #[test]
    fn joinchat_and_status_links_are_skipped() {
        let html = r#"
            <a href="https://t.me/joinchat/abc123">Group</a>
            <a href="https://x.com/acme/status/99">Post</a>
            <a href="https://twitter.com/intent/tweet?text=hi">Share</a>
        "#;
        let info = HttpEnricher::new().parse_html(html);
        assert!(info.telegram_url.is_none());
        assert!(info.social_handle.is_none());
    }

    #[test]
    fn text_email_fallback_skips_asset_names() {
        let html = "Reach us: hello@acme.io. Logo: image@2x.png";
        let info = HttpEnricher::new().parse_html(html);
        assert_eq!(info.email.as_deref(), Some("hello@acme.io"));

        let only_assets = "icon@2x.png sprite@3x.webp";
        assert!(HttpEnricher::new().parse_html(only_assets).email.is_none());
    }

    #[test]
    fn first_match_wins_per_channel() {
        let html = r#"
            <a href="https://t.me/first">One</a>
            <a href="https://t.me/second">Two</a>
        "#;
        let info = HttpEnricher::new().parse_html(html);
        assert_eq!(info.telegram_url.as_deref(), Some("https://t.me/first"));
    }
}
