//! Generation hand-off: businesses that reach confirmed_no_website get
//! submitted to the external website generator, exactly once per business.

use leadgrid_common::ValidationStatus;
use leadgrid_store::{Business, Zone};
use serde::Serialize;
use uuid::Uuid;

use crate::deps::EngineDeps;
use crate::workers::WorkFailure;

const MAX_REVIEW_SNIPPETS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub business_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub phones: Vec<String>,
    pub rating: Option<f64>,
    pub review_snippets: Vec<String>,
}

/// Pull up to three review texts out of the most recent provider payload.
/// Providers differ on the key; both observed spellings are checked.
pub fn review_snippets(raw_listing_data: &serde_json::Value) -> Vec<String> {
    let Some(latest) = raw_listing_data.as_array().and_then(|a| a.last()) else {
        return Vec::new();
    };

    ["reviews_sample", "review_snippets"]
        .iter()
        .filter_map(|key| latest.get(*key))
        .filter_map(|v| v.as_array())
        .flatten()
        .filter_map(|entry| {
            entry
                .get("text")
                .or(entry.get("review_text"))
                .and_then(|t| t.as_str())
        })
        .map(|s| s.to_string())
        .take(MAX_REVIEW_SNIPPETS)
        .collect()
}

pub fn build_generation_request(business: &Business) -> GenerationRequest {
    GenerationRequest {
        business_id: business.id,
        name: business.name.clone(),
        category: business.category.clone(),
        phones: business.phone.iter().cloned().collect(),
        rating: business.rating,
        review_snippets: review_snippets(&business.raw_listing_data),
    }
}

pub async fn run_submit(
    deps: &EngineDeps,
    business_id: Uuid,
    _item_id: Uuid,
) -> Result<(), WorkFailure> {
    let business = Business::find_by_id(business_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;

    if business.status() != ValidationStatus::ConfirmedNoWebsite {
        tracing::warn!(
            business_id = %business_id,
            status = %business.status(),
            "Submit item for a business not in confirmed_no_website; completing"
        );
        return Ok(());
    }

    if business.generation_queued_at.is_some() {
        tracing::debug!(business_id = %business_id, "Generation already queued; completing");
        return Ok(());
    }

    let request = build_generation_request(&business);
    // The generator deduplicates on business id, so a crash between submit
    // and stamp cannot double-generate.
    let accept_token = deps
        .generator
        .submit(&request)
        .await
        .map_err(WorkFailure::transient)?;

    tracing::info!(business_id = %business_id, accept_token = %accept_token, "Generation task submitted");

    let newly_stamped = Business::try_set_generation_queued(business_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;

    if newly_stamped {
        if let Some(zone_id) = business.zone_id {
            Zone::increment_generation_count(zone_id, &deps.pool)
                .await
                .map_err(WorkFailure::from_store)?;
        }
    }

    Ok(())
}
