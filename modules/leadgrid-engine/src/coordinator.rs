//! Campaign coordination: accept a campaign request, plan zones, fan out
//! scrape work, and report progress.

use chrono::Duration as ChronoDuration;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use leadgrid_common::{CampaignMode, WorkKind};
use leadgrid_store::{Campaign, CampaignProgress, NewCampaign, NewWorkItem, NewZone, Zone};

use crate::deps::EngineDeps;
use crate::planner::{self, CampaignSpec, PlannedZone};

/// Window within which a same-geography campaign counts as a duplicate.
const DUPLICATE_WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("an active campaign for this geography already exists: {0}")]
    Duplicate(Uuid),

    #[error(transparent)]
    Planner(#[from] planner::PlannerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ZonePlanSummary {
    pub zone_id: String,
    pub center: (f64, f64),
    pub radius_km: f64,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedCampaign {
    pub campaign_id: Uuid,
    pub planner_mode: String,
    pub zones: Vec<ZonePlanSummary>,
}

/// Plan zones for the request: adaptive when the district source cooperates,
/// uniform grid otherwise. Returns the zones, the mode label, and the raw
/// adaptive response for the campaign record.
async fn plan_zones(
    deps: &EngineDeps,
    spec: &CampaignSpec,
) -> Result<(Vec<PlannedZone>, String, Option<serde_json::Value>), planner::PlannerError> {
    match deps
        .districts
        .plan_districts(&spec.city, &spec.region, &spec.country, &spec.category)
        .await
    {
        Ok(plan) if !plan.districts.is_empty() => {
            let raw = serde_json::to_value(&plan).ok();
            Ok((planner::plan_adaptive(&plan), "adaptive".to_string(), raw))
        }
        Ok(_) => {
            tracing::warn!(city = %spec.city, "District source returned no districts; using uniform grid");
            uniform(spec)
        }
        Err(err) => {
            tracing::warn!(city = %spec.city, error = %err, "District source failed; using uniform grid");
            uniform(spec)
        }
    }
}

fn uniform(
    spec: &CampaignSpec,
) -> Result<(Vec<PlannedZone>, String, Option<serde_json::Value>), planner::PlannerError> {
    let (center, population) = planner::resolve_city(spec)?;
    Ok((
        planner::plan_uniform(&spec.city, center, population),
        "uniform".to_string(),
        None,
    ))
}

pub async fn create_campaign(
    deps: &EngineDeps,
    spec: CampaignSpec,
    mode: CampaignMode,
) -> Result<CreatedCampaign, CoordinatorError> {
    if let Some(existing) = Campaign::find_recent_duplicate(
        &spec.country,
        &spec.region,
        &spec.city,
        &spec.category,
        ChronoDuration::minutes(DUPLICATE_WINDOW_MINUTES),
        &deps.pool,
    )
    .await
    .map_err(|e| CoordinatorError::Other(e.into()))?
    {
        return Err(CoordinatorError::Duplicate(existing.id));
    }

    let (planned, planner_mode, planner_response) = plan_zones(deps, &spec).await?;

    let campaign = Campaign::create(
        NewCampaign {
            country: spec.country.clone(),
            region: spec.region.clone(),
            city: spec.city.clone(),
            category: spec.category.clone(),
            mode,
            planner_mode: planner_mode.clone(),
            planner_response,
        },
        &deps.pool,
    )
    .await
    .map_err(|e| CoordinatorError::Other(e.into()))?;

    let new_zones: Vec<NewZone> = planned
        .iter()
        .map(|z| NewZone {
            zone_id: z.zone_id.clone(),
            name: z.name.clone(),
            center_lat: z.center_lat,
            center_lng: z.center_lng,
            radius_km: z.radius_km,
            priority: z.priority,
        })
        .collect();

    let zones = Zone::create_many(campaign.id, &new_zones, &deps.pool)
        .await
        .map_err(|e| CoordinatorError::Other(e.into()))?;

    // Draft campaigns stop here: zones are planned and persisted but no
    // scrape work is enqueued.
    if mode == CampaignMode::Live {
        for zone in &zones {
            deps.queue
                .enqueue(
                    NewWorkItem::new(
                        WorkKind::ScrapeZone,
                        serde_json::json!({
                            "zone_id": zone.id,
                            "campaign_id": campaign.id,
                        }),
                        zone.id.to_string(),
                    )
                    .with_priority(zone.priority),
                )
                .await
                .map_err(|e| CoordinatorError::Other(e.into()))?;
        }
    }

    tracing::info!(
        campaign_id = %campaign.id,
        zones = zones.len(),
        planner = %planner_mode,
        mode = %mode,
        "Campaign created"
    );

    Ok(CreatedCampaign {
        campaign_id: campaign.id,
        planner_mode,
        zones: zones
            .iter()
            .map(|z| ZonePlanSummary {
                zone_id: z.zone_id.clone(),
                center: (z.center_lat, z.center_lng),
                radius_km: z.radius_km,
                priority: z.priority,
            })
            .collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct ZoneStatusSummary {
    pub zone_id: String,
    pub name: String,
    pub status: String,
    pub priority: i32,
    pub attempt_count: i32,
    pub raw_count: i32,
    pub saved_count: i32,
    pub with_website_count: i32,
    pub without_website_count: i32,
    pub queued_for_generation_count: i32,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CampaignStatusReport {
    pub campaign_id: Uuid,
    pub status: String,
    pub zones: Vec<ZoneStatusSummary>,
    pub total_zones: i64,
    pub completed_zones: i64,
    pub failed_zones: i64,
    pub raw_total: i64,
    pub saved_total: i64,
    pub with_valid_website: i64,
    pub needs_website: i64,
    pub queued_for_generation: i64,
    pub average_attempts: f64,
}

pub async fn campaign_status(
    deps: &EngineDeps,
    campaign_id: Uuid,
) -> anyhow::Result<CampaignStatusReport> {
    let campaign = Campaign::find_by_id(campaign_id, &deps.pool).await?;
    let zones = Zone::find_by_campaign(campaign_id, &deps.pool).await?;
    let progress: CampaignProgress = Zone::progress(campaign_id, &deps.pool).await?;

    Ok(CampaignStatusReport {
        campaign_id,
        status: campaign.status,
        zones: zones
            .into_iter()
            .map(|z| ZoneStatusSummary {
                zone_id: z.zone_id,
                name: z.name,
                status: z.status,
                priority: z.priority,
                attempt_count: z.attempt_count,
                raw_count: z.raw_count,
                saved_count: z.saved_count,
                with_website_count: z.with_website_count,
                without_website_count: z.without_website_count,
                queued_for_generation_count: z.queued_for_generation_count,
                error_message: z.error_message,
            })
            .collect(),
        total_zones: progress.total_zones,
        completed_zones: progress.completed,
        failed_zones: progress.failed,
        raw_total: progress.raw_total,
        saved_total: progress.saved_total,
        with_valid_website: progress.with_website_total,
        needs_website: progress.without_website_total,
        queued_for_generation: progress.queued_for_generation_total,
        average_attempts: progress.avg_attempts.unwrap_or(0.0),
    })
}

pub async fn cancel_campaign(deps: &EngineDeps, campaign_id: Uuid) -> anyhow::Result<()> {
    Campaign::cancel(campaign_id, &deps.pool).await?;
    tracing::info!(campaign_id = %campaign_id, "Campaign cancelled");
    Ok(())
}
