use anyhow::Result;

/// Hosts that are never a business's own website: aggregators, directories,
/// social networks, map providers. Compared by domain suffix.
pub const DEFAULT_BLOCKED_HOSTS: &[&str] = &[
    "yelp.com",
    "yellowpages.com",
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "youtube.com",
    "pinterest.com",
    "bbb.org",
    "chamberofcommerce.com",
    "mapquest.com",
    "foursquare.com",
    "tripadvisor.com",
    "angi.com",
    "angieslist.com",
    "homeadvisor.com",
    "thumbtack.com",
    "houzz.com",
    "porch.com",
    "bark.com",
    "nextdoor.com",
    "groupon.com",
    "zocdoc.com",
    "healthgrades.com",
    "vitals.com",
    "avvo.com",
    "justia.com",
    "findlaw.com",
    "lawyers.com",
    "superpages.com",
    "manta.com",
    "merchantcircle.com",
    "citysearch.com",
    "hotfrog.com",
    "cylex.us.com",
    "opentable.com",
    "doordash.com",
    "grubhub.com",
    "google.com",
    "goo.gl",
];

/// Realistic desktop user agents rotated by the renderer.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.97",
];

/// Application configuration loaded from environment variables.
/// One validated struct passed in at startup; all defaults here are part of
/// the external contract.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // External providers
    pub listing_api_key: String,
    pub search_api_key: String,
    pub anthropic_api_key: String,

    // Renderer service
    pub render_base_url: String,
    pub render_token: Option<String>,
    pub render_max_concurrent: usize,

    // Generator hand-off
    pub generator_url: String,
    pub generator_webhook_secret: String,

    // Per-call timeouts (seconds)
    pub listing_timeout_seconds: u64,
    pub renderer_timeout_seconds: u64,
    pub search_timeout_seconds: u64,
    pub llm_timeout_seconds: u64,

    // Worker pool concurrency
    pub scrape_concurrency: usize,
    pub validate_concurrency: usize,
    pub discover_concurrency: usize,
    pub submit_concurrency: usize,

    // Retry policy
    pub retry_backoff_base_seconds: u64,
    pub retry_backoff_cap_seconds: u64,

    // Provider rate limits
    pub search_rate_per_sec: f64,

    // Prescreen blocklist and renderer user agents
    pub blocked_hosts: Vec<String>,
    pub user_agent_pool: Vec<String>,

    // Ingress server
    pub server_host: String,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")?,
            listing_api_key: std::env::var("LISTING_API_KEY")?,
            search_api_key: std::env::var("SEARCH_API_KEY")?,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")?,
            render_base_url: std::env::var("RENDER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            render_token: std::env::var("RENDER_TOKEN").ok(),
            render_max_concurrent: env_parse("RENDER_MAX_CONCURRENT", 8),
            generator_url: std::env::var("GENERATOR_URL")?,
            generator_webhook_secret: std::env::var("GENERATOR_WEBHOOK_SECRET")?,
            listing_timeout_seconds: env_parse("LISTING_TIMEOUT_SECONDS", 60),
            renderer_timeout_seconds: env_parse("RENDERER_TIMEOUT_SECONDS", 30),
            search_timeout_seconds: env_parse("SEARCH_TIMEOUT_SECONDS", 15),
            llm_timeout_seconds: env_parse("LLM_TIMEOUT_SECONDS", 30),
            scrape_concurrency: env_parse("SCRAPE_CONCURRENCY", 2),
            validate_concurrency: env_parse("VALIDATE_CONCURRENCY", 6),
            discover_concurrency: env_parse("DISCOVER_CONCURRENCY", 3),
            submit_concurrency: env_parse("SUBMIT_CONCURRENCY", 1),
            retry_backoff_base_seconds: env_parse("RETRY_BACKOFF_BASE_SECONDS", 30),
            retry_backoff_cap_seconds: env_parse("RETRY_BACKOFF_CAP_SECONDS", 3600),
            search_rate_per_sec: env_parse("SEARCH_RATE_PER_SEC", 1.6),
            blocked_hosts: env_list("BLOCKED_HOSTS", DEFAULT_BLOCKED_HOSTS),
            user_agent_pool: env_list("USER_AGENT_POOL", DEFAULT_USER_AGENTS),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env_parse("SERVER_PORT", 8080),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "<not set>".to_string();
            }
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  LISTING_API_KEY: {}", preview(&self.listing_api_key));
        tracing::info!("  SEARCH_API_KEY: {}", preview(&self.search_api_key));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview(&self.anthropic_api_key));
        tracing::info!("  RENDER_BASE_URL: {}", self.render_base_url);
        tracing::info!("  GENERATOR_URL: {}", self.generator_url);
        tracing::info!(
            "  concurrency: scrape={} validate={} discover={} submit={}",
            self.scrape_concurrency,
            self.validate_concurrency,
            self.discover_concurrency,
            self.submit_concurrency,
        );
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blocklist_covers_major_aggregators() {
        for host in ["yelp.com", "facebook.com", "yellowpages.com", "bbb.org"] {
            assert!(DEFAULT_BLOCKED_HOSTS.contains(&host), "missing {host}");
        }
        assert!(DEFAULT_BLOCKED_HOSTS.len() >= 40);
    }

    #[test]
    fn user_agent_pool_is_large_enough() {
        assert!(DEFAULT_USER_AGENTS.len() >= 5);
    }
}
