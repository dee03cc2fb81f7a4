//! Website discovery: search the web for a business with no (surviving)
//! candidate URL, verify the results, and either hand a fresh candidate back
//! to validation or conclude no website exists.

use anyhow::Context;
use chrono::Utc;
use leadgrid_common::{DiscoveryAttempt, ValidationStatus, WebsiteSource};
use leadgrid_store::{Business, NewValidationRecord, TransitionCommit, UrlChange};
use uuid::Uuid;

use crate::deps::EngineDeps;
use crate::disposition::{
    self, business_context, campaign_cancelled, discovery_decision, DiscoveryDecision,
};
use crate::verifier::Evidence;
use crate::workers::WorkFailure;

const SEARCH_RESULT_LIMIT: u32 = 10;

/// The search query is the literal `"{name} {city}"`. No quoting, no
/// appended keywords, no region qualifier. Fancier forms get rejected by
/// the provider at a high rate. The region goes in the country parameter.
pub fn search_query(name: &str, city: Option<&str>) -> String {
    match city {
        Some(city) if !city.is_empty() => format!("{name} {city}"),
        _ => name.to_string(),
    }
}

pub async fn run_discovery(
    deps: &EngineDeps,
    business_id: Uuid,
    item_id: Uuid,
) -> Result<(), WorkFailure> {
    let business = Business::find_by_id(business_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;

    if business.status().is_terminal() {
        tracing::debug!(business_id = %business_id, status = %business.status(), "Already terminal; completing");
        return Ok(());
    }

    if campaign_cancelled(deps, &business).await? {
        tracing::info!(business_id = %business_id, "Campaign cancelled; skipping discovery");
        return Ok(());
    }

    let business = match business.status() {
        ValidationStatus::NeedsDiscovery => TransitionCommit::new(
            business_id,
            ValidationStatus::NeedsDiscovery,
            ValidationStatus::DiscoveryInProgress,
        )
        .apply(&deps.pool, &deps.queue)
        .await
        .map_err(WorkFailure::from_store)?,
        ValidationStatus::DiscoveryInProgress => business,
        other => {
            tracing::warn!(business_id = %business_id, status = %other, "Discover item in non-discovery state; completing");
            return Ok(());
        }
    };

    // Global token bucket keeps aggregate search QPS under the provider cap.
    deps.search_bucket.acquire().await;

    let query = search_query(&business.name, business.city.as_deref());
    let country = business
        .country
        .as_deref()
        .unwrap_or("us")
        .to_lowercase();

    let results = deps
        .searcher
        .search(&query, &country, SEARCH_RESULT_LIMIT)
        .await
        .map_err(|e| {
            if e.is_transient() {
                WorkFailure::transient(anyhow::anyhow!(e))
            } else {
                WorkFailure::permanent(anyhow::anyhow!(e))
            }
        })?;

    let evidence = Evidence::SearchResults { results };
    let context = business_context(&business);

    let verdict = deps
        .verifier
        .verify(&context, &evidence)
        .await
        .map_err(WorkFailure::transient)?;

    let seen = business.metadata().seen_urls();
    let decision = discovery_decision(&verdict, &seen);

    let found_url = match &decision {
        DiscoveryDecision::Validate(url) => Some(url.clone()),
        DiscoveryDecision::NoWebsite => None,
    };

    let record = NewValidationRecord {
        business_id,
        url_evaluated: found_url.clone().unwrap_or_else(|| format!("search:{query}")),
        evidence_kind: evidence.kind().to_string(),
        evidence: serde_json::to_value(&evidence)
            .context("serialize evidence")
            .map_err(WorkFailure::permanent)?,
        verdict: serde_json::to_value(&verdict)
            .context("serialize verdict")
            .map_err(WorkFailure::permanent)?,
        model: deps.verifier.model_name().to_string(),
    };

    let attempt = DiscoveryAttempt {
        attempted: true,
        timestamp: Utc::now(),
        found_url: found_url.clone(),
        verdict: Some(verdict.verdict.to_string()),
    };

    match decision {
        DiscoveryDecision::Validate(url) => {
            tracing::info!(business_id = %business_id, url = %url, "Search recovered a candidate site");
            let mut commit = TransitionCommit::new(
                business_id,
                ValidationStatus::DiscoveryInProgress,
                ValidationStatus::Validating,
            );
            commit.url_change = UrlChange::Set(url);
            commit.source = Some(WebsiteSource::Search);
            commit.discovery_attempt = Some(("search".to_string(), attempt));
            commit.validation_record = Some(record);
            commit.follow_up = Some(disposition::validate_item(business_id));
            commit.complete_item = Some(item_id);
            commit
                .apply(&deps.pool, &deps.queue)
                .await
                .map_err(WorkFailure::from_store)?;
        }
        DiscoveryDecision::NoWebsite => {
            tracing::info!(business_id = %business_id, "Discovery exhausted; confirmed no website");
            let mut commit = TransitionCommit::new(
                business_id,
                ValidationStatus::DiscoveryInProgress,
                ValidationStatus::ConfirmedNoWebsite,
            );
            commit.discovery_attempt = Some(("search".to_string(), attempt));
            commit.validation_record = Some(record);
            commit.follow_up = Some(disposition::generation_item(business_id));
            commit.complete_item = Some(item_id);
            commit
                .apply(&deps.pool, &deps.queue)
                .await
                .map_err(WorkFailure::from_store)?;
        }
    }

    Business::set_discovery_completed(business_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;

    Ok(())
}
