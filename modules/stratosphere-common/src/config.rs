use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Collection run defaults
    pub target_new_leads: u32,
    pub max_loops: u32,
    pub stagnation_threshold: u32,
    pub duplicate_streak_threshold: u32,
    pub run_timeout: Duration,
    pub adapter_timeout: Duration,
    pub retention_days: i64,
    pub enrich_concurrency: usize,

    // Source API keys (optional; an adapter without its key degrades to the
    // anonymous tier or skips itself)
    pub market_api_key: String,
    pub apify_api_token: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parse_env("WEB_PORT", 3000),
            target_new_leads: parse_env("TARGET_NEW_LEADS", 100),
            max_loops: parse_env("MAX_LOOPS", 10),
            stagnation_threshold: parse_env("STAGNATION_THRESHOLD", 2),
            duplicate_streak_threshold: parse_env("DUPLICATE_STREAK_THRESHOLD", 20),
            run_timeout: Duration::from_secs(parse_env("RUN_TIMEOUT_SECS", 900)),
            adapter_timeout: Duration::from_secs(parse_env("COLLECTOR_TIMEOUT_SECS", 60)),
            retention_days: parse_env("RETENTION_DAYS", 7),
            enrich_concurrency: parse_env("ENRICH_CONCURRENCY", 5),
            market_api_key: env::var("MARKET_API_KEY").unwrap_or_default(),
            apify_api_token: env::var("APIFY_API_TOKEN").unwrap_or_default(),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
