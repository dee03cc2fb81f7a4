//! Scenario harness: real Postgres via testcontainers, hand-written fakes
//! for the four external services. No network leaves the test process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;

use leadgrid_common::{normalize_url, AppConfig};
use leadgrid_engine::planner::DistrictPlan;
use leadgrid_engine::prescreen::{check_static, PrescreenOutcome};
use leadgrid_engine::render::{RenderError, RenderedPage};
use leadgrid_engine::submitter::GenerationRequest;
use leadgrid_engine::traits::{
    DistrictSource, GenerationService, ListingProvider, PageRenderer, UrlPrescreener,
    VerdictModel, WebSearcher,
};
use leadgrid_engine::verifier::{BusinessContext, Evidence, Verdict};
use leadgrid_engine::workers;
use leadgrid_engine::EngineDeps;
use leadgrid_engine::ratelimit::TokenBucket;
use leadgrid_store::testutil::postgres_container;
use leadgrid_store::Queue;
use listing_client::{ListingError, PlacesQuery, RawBusiness};
use serp_client::{SearchResult, SerpError};

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        listing_api_key: "test".to_string(),
        search_api_key: "test".to_string(),
        anthropic_api_key: "test".to_string(),
        render_base_url: "http://localhost:3000".to_string(),
        render_token: None,
        render_max_concurrent: 8,
        generator_url: "http://localhost:9000".to_string(),
        generator_webhook_secret: "test-secret".to_string(),
        listing_timeout_seconds: 60,
        renderer_timeout_seconds: 30,
        search_timeout_seconds: 15,
        llm_timeout_seconds: 30,
        scrape_concurrency: 2,
        validate_concurrency: 6,
        discover_concurrency: 3,
        submit_concurrency: 1,
        retry_backoff_base_seconds: 0,
        retry_backoff_cap_seconds: 0,
        search_rate_per_sec: 1000.0,
        blocked_hosts: leadgrid_common::config::DEFAULT_BLOCKED_HOSTS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        user_agent_pool: leadgrid_common::config::DEFAULT_USER_AGENTS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
    }
}

// --- Fakes ---

pub struct FakeListing {
    pub results: Vec<RawBusiness>,
}

#[async_trait]
impl ListingProvider for FakeListing {
    async fn search(&self, _query: &PlacesQuery) -> Result<Vec<RawBusiness>, ListingError> {
        Ok(self.results.clone())
    }
}

pub struct FakeSearcher {
    pub results: Vec<SearchResult>,
}

#[async_trait]
impl WebSearcher for FakeSearcher {
    async fn search(
        &self,
        _query: &str,
        _country: &str,
        _results: u32,
    ) -> Result<Vec<SearchResult>, SerpError> {
        Ok(self.results.clone())
    }
}

/// Static checks only; no DNS, no sockets.
pub struct StaticPrescreener {
    pub blocked_hosts: Vec<String>,
}

#[async_trait]
impl UrlPrescreener for StaticPrescreener {
    async fn prescreen(&self, url: &str) -> PrescreenOutcome {
        match check_static(url, &self.blocked_hosts) {
            Ok(_) => PrescreenOutcome::Pass,
            Err(failure) => PrescreenOutcome::Fail(failure),
        }
    }
}

/// Pages keyed by normalized URL; everything else fails navigation.
pub struct FakeRenderer {
    pub pages: HashMap<String, RenderedPage>,
}

impl FakeRenderer {
    pub fn with_page(url: &str, page: RenderedPage) -> Self {
        let mut pages = HashMap::new();
        pages.insert(normalize_url(url), page);
        Self { pages }
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        self.pages
            .get(&normalize_url(url))
            .cloned()
            .ok_or_else(|| RenderError::NavigationFailed("no such fixture".to_string()))
    }
}

type VerdictRule = Box<dyn Fn(&BusinessContext, &Evidence) -> Verdict + Send + Sync>;

/// Verdicts computed by a rule closure, standing in for the LLM.
pub struct RuleVerifier {
    rule: VerdictRule,
}

impl RuleVerifier {
    pub fn new(rule: impl Fn(&BusinessContext, &Evidence) -> Verdict + Send + Sync + 'static) -> Self {
        Self {
            rule: Box::new(rule),
        }
    }
}

#[async_trait]
impl VerdictModel for RuleVerifier {
    fn model_name(&self) -> &str {
        "rule-verifier"
    }

    async fn verify(
        &self,
        context: &BusinessContext,
        evidence: &Evidence,
    ) -> anyhow::Result<Verdict> {
        Ok((self.rule)(context, evidence))
    }
}

/// District source that always fails, forcing the uniform-grid fallback.
pub struct NoDistricts;

#[async_trait]
impl DistrictSource for NoDistricts {
    async fn plan_districts(
        &self,
        _city: &str,
        _region: &str,
        _country: &str,
        _category: &str,
    ) -> anyhow::Result<DistrictPlan> {
        anyhow::bail!("district source disabled in tests")
    }
}

#[derive(Default)]
pub struct RecordingGenerator {
    pub submissions: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl GenerationService for RecordingGenerator {
    async fn submit(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let mut submissions = self.submissions.lock().await;
        submissions.push(request.clone());
        Ok(format!("accept-{}", submissions.len()))
    }
}

// --- Context ---

pub struct TestContext {
    pub _container: Box<dyn std::any::Any + Send>,
    pub pool: PgPool,
    pub deps: EngineDeps,
    pub generator: Arc<RecordingGenerator>,
}

pub struct Services {
    pub listing: Vec<RawBusiness>,
    pub search_results: Vec<SearchResult>,
    pub renderer: FakeRenderer,
    pub verifier: RuleVerifier,
}

impl TestContext {
    pub async fn new(services: Services) -> Self {
        let (container, pool) = postgres_container().await;
        let config = test_config();

        let queue = Queue::new(pool.clone(), Duration::ZERO, Duration::ZERO);
        let generator = Arc::new(RecordingGenerator::default());

        let deps = EngineDeps {
            pool: pool.clone(),
            queue,
            listing: Arc::new(FakeListing {
                results: services.listing,
            }),
            searcher: Arc::new(FakeSearcher {
                results: services.search_results,
            }),
            prescreener: Arc::new(StaticPrescreener {
                blocked_hosts: config.blocked_hosts.clone(),
            }),
            renderer: Arc::new(services.renderer),
            verifier: Arc::new(services.verifier),
            districts: Arc::new(NoDistricts),
            generator: generator.clone(),
            search_bucket: Arc::new(TokenBucket::new(config.search_rate_per_sec, 10.0)),
            config,
        };

        Self {
            _container: Box::new(container),
            pool,
            deps,
            generator,
        }
    }

    /// Lease and process items single-threaded until the queue is empty.
    /// Zero-backoff queue config makes retries immediately leasable, so a
    /// drained queue means every item completed or dead-lettered.
    pub async fn drain(&self) {
        let kinds = [
            leadgrid_common::WorkKind::ScrapeZone,
            leadgrid_common::WorkKind::ValidateBusiness,
            leadgrid_common::WorkKind::DiscoverWebsite,
            leadgrid_common::WorkKind::SubmitGeneration,
        ];

        for _ in 0..500 {
            let item = self
                .deps
                .queue
                .lease(&kinds, Duration::from_secs(60), "test-worker")
                .await
                .expect("lease failed");

            match item {
                Some(item) => workers::process_item(&self.deps, item).await,
                None => {
                    if self.deps.queue.pending_count().await.unwrap() == 0 {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
            }
        }
        panic!("queue did not drain within the iteration budget");
    }
}

// --- Fixture builders ---

pub fn raw_business(json: serde_json::Value) -> RawBusiness {
    serde_json::from_value(json).expect("fixture RawBusiness")
}

pub fn rendered_page(url: &str, title: &str, phone: &str) -> RenderedPage {
    RenderedPage {
        final_url: url.to_string(),
        title: title.to_string(),
        meta_description: String::new(),
        phones: vec![phone.to_string()],
        emails: vec![],
        has_address: true,
        has_hours: false,
        content_preview: format!("{title}, serving the neighborhood since 2004."),
        word_count: 450,
        image_count: 3,
        form_count: 1,
        screenshot_ref: None,
    }
}

pub fn search_result(position: u32, title: &str, link: &str) -> SearchResult {
    SearchResult {
        position,
        title: title.to_string(),
        link: link.to_string(),
        snippet: String::new(),
    }
}
