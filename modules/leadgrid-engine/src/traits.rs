//! Service seams. The pipeline talks to every external system through one
//! of these traits; live adapters wrap the client crates and tests swap in
//! hand-written fakes.

use async_trait::async_trait;

use listing_client::{ListingError, PlacesQuery, RawBusiness};
use serp_client::{SearchResult, SerpError};

use crate::planner::DistrictPlan;
use crate::prescreen::PrescreenOutcome;
use crate::render::{RenderError, RenderedPage};
use crate::submitter::GenerationRequest;
use crate::verifier::{BusinessContext, Evidence, Verdict};

#[async_trait]
pub trait ListingProvider: Send + Sync {
    async fn search(&self, query: &PlacesQuery) -> Result<Vec<RawBusiness>, ListingError>;
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(
        &self,
        query: &str,
        country: &str,
        results: u32,
    ) -> Result<Vec<SearchResult>, SerpError>;
}

#[async_trait]
pub trait UrlPrescreener: Send + Sync {
    async fn prescreen(&self, url: &str) -> PrescreenOutcome;
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError>;
}

#[async_trait]
pub trait VerdictModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn verify(
        &self,
        context: &BusinessContext,
        evidence: &Evidence,
    ) -> anyhow::Result<Verdict>;
}

/// Adaptive geo planning (LLM district knowledge). Fallible by design; the
/// planner falls back to the uniform grid.
#[async_trait]
pub trait DistrictSource: Send + Sync {
    async fn plan_districts(
        &self,
        city: &str,
        region: &str,
        country: &str,
        category: &str,
    ) -> anyhow::Result<DistrictPlan>;
}

/// External website generator hand-off. Fire-and-forget: returns the
/// generator's accept token.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> anyhow::Result<String>;
}
