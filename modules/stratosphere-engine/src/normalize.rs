//! Canonical comparison keys for candidate identity.
//!
//! All three functions are deterministic and idempotent: feeding a canonical
//! value back in returns it unchanged.

use url::Url;

/// Path segments that indicate a scraper matched a platform page rather than
/// a user profile. Handles normalizing to one of these are rejected.
const RESERVED_SEGMENTS: &[&str] = &[
    "search",
    "home",
    "explore",
    "status",
    "intent",
    "i",
    "hashtag",
    "share",
    "login",
    "signup",
    "notifications",
    "messages",
];

/// URL prefixes of known messaging-channel shapes, scheme and host stripped.
const CHANNEL_HOSTS: &[&str] = &["t.me/", "telegram.me/", "discord.gg/", "discord.com/invite/"];

/// Lowercased host with a leading `www.` stripped. A missing scheme is
/// tolerated (`https://` is assumed). Returns None for empty or unparseable
/// input.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_lowercase())
}

/// Lowercased social handle: leading `@` stripped, profile URLs reduced to
/// their first path segment, query strings dropped. Reserved platform path
/// segments return None.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Full profile URL: take the path segment after the host.
    let mut value = trimmed.to_string();
    if trimmed.contains("://") || (trimmed.contains('/') && trimmed.contains('.')) {
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let parsed = Url::parse(&with_scheme).ok()?;
        value = parsed
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))?
            .to_string();
    }

    let value = value.trim_start_matches('@');
    let value = value.split('?').next().unwrap_or("");
    let value = value.trim_matches('/');
    if value.is_empty() {
        return None;
    }

    let lower = value.to_lowercase();
    if RESERVED_SEGMENTS.contains(&lower.as_str()) {
        return None;
    }
    Some(lower)
}

/// Lowercased messaging-channel id: scheme/host prefix stripped for known
/// channel URL shapes, trailing path segments dropped, leading `@` stripped.
/// Telegram `joinchat` links carry no channel identity and return None.
pub fn normalize_channel(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut value = trimmed;
    if let Some((_, rest)) = value.split_once("://") {
        value = rest;
    }
    value = value.strip_prefix("www.").unwrap_or(value);
    for host in CHANNEL_HOSTS {
        if let Some(rest) = value.strip_prefix(host) {
            value = rest;
            break;
        }
    }

    let value = value.split('/').next().unwrap_or("");
    let value = value.split('?').next().unwrap_or("");
    let value = value.trim_start_matches('@');
    if value.is_empty() {
        return None;
    }

    let lower = value.to_lowercase();
    if lower == "joinchat" {
        return None;
    }
    Some(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_strips_scheme_www_and_lowercases() {
        assert_eq!(
            normalize_domain("https://www.Acme.IO/launch?x=1"),
            Some("acme.io".to_string())
        );
        assert_eq!(normalize_domain("http://acme.io"), Some("acme.io".to_string()));
    }

    #[test]
    fn domain_tolerates_missing_scheme() {
        assert_eq!(normalize_domain("acme.io/path"), Some("acme.io".to_string()));
        assert_eq!(normalize_domain("www.acme.io"), Some("acme.io".to_string()));
    }

    #[test]
    fn domain_rejects_empty_and_garbage() {
        assert_eq!(normalize_domain(""), None);
        assert_eq!(normalize_domain("   "), None);
        assert_eq!(normalize_domain("http://"), None);
    }

    #[test]
    fn domain_is_idempotent() {
        let once = normalize_domain("https://www.Uniswap.org/swap").unwrap();
        assert_eq!(normalize_domain(&once), Some(once.clone()));
    }

    #[test]
    fn handle_strips_at_and_lowercases() {
        assert_eq!(normalize_handle("@Uniswap"), Some("uniswap".to_string()));
        assert_eq!(normalize_handle("@FOO"), Some("foo".to_string()));
    }

    #[test]
    fn handle_extracts_from_profile_url() {
        assert_eq!(
            normalize_handle("https://twitter.com/Uniswap?ref=home"),
            Some("uniswap".to_string())
        );
        assert_eq!(normalize_handle("x.com/Acme"), Some("acme".to_string()));
    }

    #[test]
    fn handle_rejects_reserved_platform_segments() {
        // A scraper that matched a search-results page, not a profile.
        assert_eq!(normalize_handle("search"), None);
        assert_eq!(normalize_handle("https://x.com/intent"), None);
        assert_eq!(normalize_handle("@status"), None);
    }

    #[test]
    fn handle_rejects_empty() {
        assert_eq!(normalize_handle(""), None);
        assert_eq!(normalize_handle("@"), None);
    }

    #[test]
    fn handle_is_idempotent() {
        let once = normalize_handle("https://x.com/SomeProject").unwrap();
        assert_eq!(normalize_handle(&once), Some(once.clone()));
    }

    #[test]
    fn channel_strips_known_hosts() {
        assert_eq!(
            normalize_channel("https://t.me/AcmePortal"),
            Some("acmeportal".to_string())
        );
        assert_eq!(normalize_channel("t.me/acme/123"), Some("acme".to_string()));
        assert_eq!(
            normalize_channel("discord.com/invite/xYz123"),
            Some("xyz123".to_string())
        );
        assert_eq!(normalize_channel("@acme_channel"), Some("acme_channel".to_string()));
    }

    #[test]
    fn channel_rejects_joinchat_links() {
        assert_eq!(normalize_channel("https://t.me/joinchat/AbCdEf"), None);
    }

    #[test]
    fn channel_is_idempotent() {
        let once = normalize_channel("https://t.me/AcmePortal").unwrap();
        assert_eq!(normalize_channel(&once), Some(once.clone()));
    }
}
