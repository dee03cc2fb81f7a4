//! Live implementations of the service seams, wrapping the client crates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use ai_client::Claude;
use browserless_client::{BrowserlessClient, BrowserlessError};
use leadgrid_common::AppConfig;
use listing_client::{ListingClient, ListingError, PlacesQuery, RawBusiness};
use serp_client::{SearchResult, SerpClient, SerpError};

use crate::planner::{district_user_prompt, DistrictPlan, DISTRICT_SYSTEM_PROMPT};
use crate::prescreen::{self, PrescreenOutcome};
use crate::render::{extract_page_facts, is_bot_wall, RenderError, RenderedPage};
use crate::submitter::GenerationRequest;
use crate::traits::{
    DistrictSource, GenerationService, ListingProvider, PageRenderer, UrlPrescreener,
    VerdictModel, WebSearcher,
};
use crate::verifier::{BusinessContext, Evidence, LlmVerifier, Verdict};

const POOL_ACQUIRE_WAIT: Duration = Duration::from_secs(10);
const HUMAN_DELAY_MS: std::ops::RangeInclusive<u64> = 200..=1500;

// --- Listing provider ---

pub struct LiveListingProvider {
    client: ListingClient,
}

impl LiveListingProvider {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            client: ListingClient::new(api_key, timeout),
        }
    }
}

#[async_trait]
impl ListingProvider for LiveListingProvider {
    async fn search(&self, query: &PlacesQuery) -> Result<Vec<RawBusiness>, ListingError> {
        self.client.search(query).await
    }
}

// --- Web search ---

pub struct LiveWebSearcher {
    client: SerpClient,
}

impl LiveWebSearcher {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            client: SerpClient::new(api_key, timeout),
        }
    }
}

#[async_trait]
impl WebSearcher for LiveWebSearcher {
    async fn search(
        &self,
        query: &str,
        country: &str,
        results: u32,
    ) -> Result<Vec<SearchResult>, SerpError> {
        self.client.search(query, country, results).await
    }
}

// --- Prescreener ---

pub struct LivePrescreener {
    blocked_hosts: Vec<String>,
    http: reqwest::Client,
}

impl LivePrescreener {
    pub fn new(blocked_hosts: Vec<String>, http: reqwest::Client) -> Self {
        Self {
            blocked_hosts,
            http,
        }
    }
}

#[async_trait]
impl UrlPrescreener for LivePrescreener {
    async fn prescreen(&self, url: &str) -> PrescreenOutcome {
        prescreen::prescreen(url, &self.blocked_hosts, &self.http).await
    }
}

// --- Renderer ---

/// Bounded browser pool with timing hygiene: a semaphore caps concurrent
/// sessions, each navigation waits a random human-scale delay, and the user
/// agent rotates through the configured pool.
pub struct LivePageRenderer {
    client: BrowserlessClient,
    sessions: Arc<Semaphore>,
    user_agents: Vec<String>,
}

impl LivePageRenderer {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.user_agent_pool.is_empty(),
            "user agent pool must not be empty"
        );
        Ok(Self {
            client: BrowserlessClient::new(
                &config.render_base_url,
                config.render_token.as_deref(),
                Duration::from_secs(config.renderer_timeout_seconds),
            ),
            sessions: Arc::new(Semaphore::new(config.render_max_concurrent)),
            user_agents: config.user_agent_pool.clone(),
        })
    }

    fn pick_user_agent(&self) -> String {
        let idx = rand::rng().random_range(0..self.user_agents.len());
        self.user_agents[idx].clone()
    }

    fn human_delay() -> Duration {
        Duration::from_millis(rand::rng().random_range(HUMAN_DELAY_MS))
    }
}

#[async_trait]
impl PageRenderer for LivePageRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        let _session = tokio::time::timeout(POOL_ACQUIRE_WAIT, self.sessions.acquire())
            .await
            .map_err(|_| RenderError::Timeout)?
            .map_err(|_| RenderError::NavigationFailed("browser pool closed".to_string()))?;

        tokio::time::sleep(Self::human_delay()).await;

        let user_agent = self.pick_user_agent();
        let content = match self.client.content(url, &user_agent).await {
            Ok(content) => content,
            Err(BrowserlessError::Network(msg)) if msg.contains("timed out") => {
                return Err(RenderError::Timeout)
            }
            Err(BrowserlessError::Network(msg)) => {
                return Err(RenderError::NavigationFailed(msg))
            }
            Err(BrowserlessError::Api { status: 403, .. })
            | Err(BrowserlessError::Api { status: 429, .. }) => return Err(RenderError::BotWall),
            Err(BrowserlessError::Api { status, message }) => {
                return Err(RenderError::NavigationFailed(format!("{status}: {message}")))
            }
        };

        if is_bot_wall(content.status, &content.html) {
            return Err(RenderError::BotWall);
        }

        let mut page = extract_page_facts(&content.final_url, &content.html);

        // Screenshot is best-effort; a failed capture never fails the render.
        match self.client.screenshot(url, &user_agent).await {
            Ok(bytes) => {
                let hash = Sha256::digest(&bytes);
                page.screenshot_ref = Some(hex::encode(hash));
            }
            Err(err) => {
                tracing::debug!(url, error = %err, "Screenshot capture failed");
            }
        }

        Ok(page)
    }
}

// --- Verifier ---

#[async_trait]
impl VerdictModel for LlmVerifier {
    fn model_name(&self) -> &str {
        self.model()
    }

    async fn verify(
        &self,
        context: &BusinessContext,
        evidence: &Evidence,
    ) -> anyhow::Result<Verdict> {
        LlmVerifier::verify(self, context, evidence).await
    }
}

// --- Adaptive planner districts ---

pub struct LiveDistrictSource {
    claude: Claude,
}

impl LiveDistrictSource {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }
}

#[async_trait]
impl DistrictSource for LiveDistrictSource {
    async fn plan_districts(
        &self,
        city: &str,
        region: &str,
        country: &str,
        category: &str,
    ) -> anyhow::Result<DistrictPlan> {
        self.claude
            .extract::<DistrictPlan>(
                DISTRICT_SYSTEM_PROMPT,
                district_user_prompt(city, region, country, category),
            )
            .await
    }
}

// --- Generator ---

pub struct HttpGenerationService {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct GeneratorAccept {
    #[serde(alias = "token")]
    accept_token: String,
}

impl HttpGenerationService {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn submit(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let url = format!("{}/tasks", self.base_url);

        let resp = self.http.post(&url).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("generator rejected submission ({status}): {body}");
        }

        let accept: GeneratorAccept = resp.json().await?;
        Ok(accept.accept_token)
    }
}
