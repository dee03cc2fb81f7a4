//! Zone scraping: query the listing provider for one zone, upsert the
//! businesses, and fan out validation work.

use uuid::Uuid;

use leadgrid_common::{WorkKind, ZoneStatus};
use leadgrid_store::{Business, Campaign, NewWorkItem, Zone, ZoneCounts};
use listing_client::PlacesQuery;

use crate::deps::EngineDeps;
use crate::normalize;
use crate::planner::country_name;
use crate::workers::WorkFailure;

const SCRAPE_LIMIT: u32 = 100;

/// The listing query for a campaign. The literal comma-separated form is
/// what the provider geocodes correctly; quoted variants do not.
pub fn listing_query(category: &str, city: &str, region: &str, country_iso2: &str) -> String {
    format!(
        "{category}, {city}, {region}, {}",
        country_name(country_iso2)
    )
}

pub async fn run_scrape(
    deps: &EngineDeps,
    zone_id: Uuid,
    campaign_id: Uuid,
    _item_id: Uuid,
) -> Result<(), WorkFailure> {
    let zone = Zone::find_by_id(zone_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;
    let campaign = Campaign::find_by_id(campaign_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;

    if campaign.is_cancelled() {
        tracing::info!(zone_id = %zone_id, "Campaign cancelled; skipping zone");
        Zone::skip(zone_id, &deps.pool)
            .await
            .map_err(WorkFailure::from_store)?;
        return Ok(());
    }

    match zone.status() {
        ZoneStatus::Completed | ZoneStatus::Skipped => {
            tracing::debug!(zone_id = %zone_id, "Zone already terminal; completing");
            return Ok(());
        }
        // A lease that expired mid-scrape comes back in `scraping`; resume
        // without burning another attempt.
        ZoneStatus::Scraping => {}
        ZoneStatus::Pending | ZoneStatus::Failed => {
            Zone::begin_attempt(zone_id, &deps.pool)
                .await
                .map_err(WorkFailure::from_store)?;
        }
    }

    let query = PlacesQuery {
        query: listing_query(
            &campaign.category,
            &campaign.city,
            &campaign.region,
            &campaign.country,
        ),
        region: campaign.country.to_lowercase(),
        language: "en".to_string(),
        limit: SCRAPE_LIMIT,
        latitude: zone.center_lat,
        longitude: zone.center_lng,
        radius_km: zone.radius_km,
    };

    let raw_businesses = deps.listing.search(&query).await.map_err(|e| {
        if e.is_transient() {
            WorkFailure::transient(anyhow::anyhow!(e))
        } else {
            WorkFailure::permanent(anyhow::anyhow!(e))
        }
    })?;

    let mut counts = ZoneCounts {
        raw: raw_businesses.len() as i32,
        ..Default::default()
    };

    for raw in &raw_businesses {
        if raw.place_id.is_empty() || raw.name.is_empty() {
            tracing::warn!(zone_id = %zone_id, "Dropping listing record without place_id or name");
            continue;
        }

        let normalized = normalize::normalize(raw);
        let has_candidate = normalized.website_url.is_some();

        let (business, _created) = Business::upsert_from_listing(&normalized, zone_id, &deps.pool)
            .await
            .map_err(WorkFailure::from_store)?;

        counts.saved += 1;
        if has_candidate {
            counts.with_website += 1;
        } else {
            counts.without_website += 1;
        }

        // Already-dispositioned businesses (from an earlier campaign or a
        // re-scrape) don't re-enter the pipeline.
        if business.status().is_terminal() {
            continue;
        }

        deps.queue
            .enqueue(NewWorkItem::new(
                WorkKind::ValidateBusiness,
                serde_json::json!({ "business_id": business.id }),
                business.id.to_string(),
            ))
            .await
            .map_err(WorkFailure::from_store)?;
    }

    Zone::complete(zone_id, counts, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;

    tracing::info!(
        zone_id = %zone_id,
        raw = counts.raw,
        saved = counts.saved,
        with_website = counts.with_website,
        without_website = counts.without_website,
        "Zone scrape complete"
    );

    Ok(())
}
