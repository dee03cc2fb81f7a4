use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use leadgrid_common::CampaignMode;
use leadgrid_engine::coordinator::{self, CoordinatorError};
use leadgrid_engine::planner::CampaignSpec;
use leadgrid_engine::EngineDeps;
use leadgrid_store::{Business, StoreError};

use crate::webhook::{self, GenerationCallback, SIGNATURE_HEADER};

pub struct AppState {
    pub deps: EngineDeps,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/campaigns", post(create_campaign))
        .route("/campaigns/{id}", get(campaign_status))
        .route("/campaigns/{id}/cancel", post(cancel_campaign))
        .route("/webhooks/generation", post(generation_webhook))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct CampaignSubmission {
    country: String,
    region: String,
    city: String,
    category: String,
    #[serde(default)]
    mode: Option<CampaignMode>,
    /// Optional geography overrides for cities outside the gazetteer.
    #[serde(default)]
    center_lat: Option<f64>,
    #[serde(default)]
    center_lng: Option<f64>,
    #[serde(default)]
    population: Option<u64>,
}

async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<CampaignSubmission>,
) -> Response {
    let center = match (submission.center_lat, submission.center_lng) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        _ => None,
    };

    let spec = CampaignSpec {
        country: submission.country,
        region: submission.region,
        city: submission.city,
        category: submission.category,
        center,
        population: submission.population,
    };
    let mode = submission.mode.unwrap_or(CampaignMode::Live);

    match coordinator::create_campaign(&state.deps, spec, mode).await {
        Ok(created) => (StatusCode::OK, Json(created)).into_response(),
        Err(CoordinatorError::Duplicate(existing)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "duplicate campaign",
                "existing_campaign_id": existing,
            })),
        )
            .into_response(),
        Err(CoordinatorError::Planner(err)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(CoordinatorError::Other(err)) => {
            tracing::error!(error = %err, "Campaign creation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn campaign_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match coordinator::campaign_status(&state.deps, id).await {
        Ok(report) => Json(report).into_response(),
        Err(err) if err.downcast_ref::<StoreError>().is_some_and(is_not_found) => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            tracing::error!(campaign_id = %id, error = %err, "Status query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn is_not_found(err: &StoreError) -> bool {
    matches!(err, StoreError::NotFound(_))
}

async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match coordinator::cancel_campaign(&state.deps, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) if err.downcast_ref::<StoreError>().is_some_and(is_not_found) => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            tracing::error!(campaign_id = %id, error = %err, "Cancel failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn generation_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !webhook::verify_signature(
        &state.deps.config.generator_webhook_secret,
        &body,
        signature,
    ) {
        tracing::warn!("Generation webhook with bad signature rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let callback: GenerationCallback = match serde_json::from_slice(&body) {
        Ok(cb) => cb,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    };

    match Business::set_generation_completed(callback.business_id, &state.deps.pool).await {
        Ok(updated) => {
            tracing::info!(
                business_id = %callback.business_id,
                status = callback.status.as_deref().unwrap_or("completed"),
                newly_completed = updated,
                "Generation completion recorded"
            );
            StatusCode::OK.into_response()
        }
        Err(err) => {
            tracing::error!(business_id = %callback.business_id, error = %err, "Webhook update failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
