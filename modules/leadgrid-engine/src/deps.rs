//! Central dependency container passed to all workers and handlers. There
//! are no global singletons: the renderer pool, rate buckets, and clients
//! all live here and are injected at startup (or swapped by tests).

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use ai_client::Claude;
use leadgrid_common::AppConfig;
use leadgrid_store::Queue;

use crate::adapters::{
    HttpGenerationService, LiveDistrictSource, LiveListingProvider, LivePageRenderer,
    LivePrescreener, LiveWebSearcher,
};
use crate::ratelimit::TokenBucket;
use crate::traits::{
    DistrictSource, GenerationService, ListingProvider, PageRenderer, UrlPrescreener,
    VerdictModel, WebSearcher,
};
use crate::verifier::{LlmVerifier, VERIFIER_MODEL};

#[derive(Clone)]
pub struct EngineDeps {
    pub pool: PgPool,
    pub queue: Queue,
    pub config: AppConfig,
    pub listing: Arc<dyn ListingProvider>,
    pub searcher: Arc<dyn WebSearcher>,
    pub prescreener: Arc<dyn UrlPrescreener>,
    pub renderer: Arc<dyn PageRenderer>,
    pub verifier: Arc<dyn VerdictModel>,
    pub districts: Arc<dyn DistrictSource>,
    pub generator: Arc<dyn GenerationService>,
    pub search_bucket: Arc<TokenBucket>,
}

impl EngineDeps {
    /// Wire up live adapters from configuration.
    pub fn live(config: AppConfig, pool: PgPool) -> anyhow::Result<Self> {
        let queue = Queue::new(
            pool.clone(),
            Duration::from_secs(config.retry_backoff_base_seconds),
            Duration::from_secs(config.retry_backoff_cap_seconds),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        let claude = Claude::new(&config.anthropic_api_key, VERIFIER_MODEL)
            .with_timeout(Duration::from_secs(config.llm_timeout_seconds));
        let verifier = LlmVerifier::new(claude.clone());

        let listing = LiveListingProvider::new(
            &config.listing_api_key,
            Duration::from_secs(config.listing_timeout_seconds),
        );
        let searcher = LiveWebSearcher::new(
            &config.search_api_key,
            Duration::from_secs(config.search_timeout_seconds),
        );
        let prescreener = LivePrescreener::new(config.blocked_hosts.clone(), http.clone());
        let renderer = LivePageRenderer::new(&config)?;
        let districts = LiveDistrictSource::new(claude);
        let generator = HttpGenerationService::new(&config.generator_url, http);

        Ok(Self {
            pool,
            queue,
            search_bucket: Arc::new(TokenBucket::new(config.search_rate_per_sec, 2.0)),
            listing: Arc::new(listing),
            searcher: Arc::new(searcher),
            prescreener: Arc::new(prescreener),
            renderer: Arc::new(renderer),
            verifier: Arc::new(verifier),
            districts: Arc::new(districts),
            generator: Arc::new(generator),
            config,
        })
    }
}
