//! Worker pools: one pool per work kind, each a set of tokio tasks leasing
//! from the shared queue. A reaper task reclaims leases from crashed
//! workers.

pub mod scrape;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use leadgrid_common::WorkKind;
use leadgrid_store::{Business, StoreError, WorkItem, Zone};

use crate::deps::EngineDeps;

const IDLE_POLL: Duration = Duration::from_secs(2);
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// A handler failure plus its retry classification.
#[derive(Debug)]
pub struct WorkFailure {
    pub error: anyhow::Error,
    pub retryable: bool,
}

impl WorkFailure {
    pub fn transient(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            retryable: true,
        }
    }

    pub fn permanent(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            retryable: false,
        }
    }

    /// Internal invariant violations abort the item but stay retriable;
    /// the attempt budget bounds how often.
    pub fn invariant(message: String) -> Self {
        Self {
            error: anyhow::anyhow!("{message}"),
            retryable: true,
        }
    }

    pub fn from_store(error: StoreError) -> Self {
        let retryable = match &error {
            StoreError::Database(_) => true,
            StoreError::InvariantViolation(_) => true,
            StoreError::NotFound(_) | StoreError::Serialization(_) => false,
        };
        Self {
            error: error.into(),
            retryable,
        }
    }
}

fn lease_duration(kind: WorkKind) -> Duration {
    match kind {
        WorkKind::ScrapeZone => Duration::from_secs(600),
        WorkKind::ValidateBusiness => Duration::from_secs(180),
        WorkKind::DiscoverWebsite => Duration::from_secs(180),
        WorkKind::SubmitGeneration => Duration::from_secs(120),
    }
}

fn pool_size(deps: &EngineDeps, kind: WorkKind) -> usize {
    match kind {
        WorkKind::ScrapeZone => deps.config.scrape_concurrency,
        WorkKind::ValidateBusiness => deps.config.validate_concurrency,
        WorkKind::DiscoverWebsite => deps.config.discover_concurrency,
        WorkKind::SubmitGeneration => deps.config.submit_concurrency,
    }
}

/// Spawn all worker pools plus the lease reaper. Runs until aborted.
pub async fn run_worker_pools(deps: Arc<EngineDeps>) {
    let kinds = [
        WorkKind::ScrapeZone,
        WorkKind::ValidateBusiness,
        WorkKind::DiscoverWebsite,
        WorkKind::SubmitGeneration,
    ];

    let mut handles = Vec::new();

    for kind in kinds {
        for index in 0..pool_size(&deps, kind) {
            let deps = deps.clone();
            let worker_id = format!("{kind}-{index}");
            handles.push(tokio::spawn(async move {
                worker_loop(deps, kind, worker_id).await;
            }));
        }
    }

    {
        let deps = deps.clone();
        handles.push(tokio::spawn(async move {
            reaper_loop(deps).await;
        }));
    }

    tracing::info!("Worker pools running");
    for handle in handles {
        let _ = handle.await;
    }
}

async fn worker_loop(deps: Arc<EngineDeps>, kind: WorkKind, worker_id: String) {
    loop {
        let leased = deps
            .queue
            .lease(&[kind], lease_duration(kind), &worker_id)
            .await;

        match leased {
            Ok(Some(item)) => {
                process_item(&deps, item).await;
            }
            Ok(None) => {
                // Jittered idle poll so a fleet of workers doesn't hammer
                // the queue in lockstep.
                let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                tokio::time::sleep(IDLE_POLL + jitter).await;
            }
            Err(err) => {
                tracing::error!(worker = %worker_id, error = %err, "Lease query failed");
                tokio::time::sleep(IDLE_POLL).await;
            }
        }
    }
}

async fn reaper_loop(deps: Arc<EngineDeps>) {
    loop {
        if let Err(err) = deps.queue.reap_expired().await {
            tracing::error!(error = %err, "Lease reaper failed");
        }
        tokio::time::sleep(REAPER_INTERVAL).await;
    }
}

#[derive(Debug, Deserialize)]
struct ZonePayload {
    zone_id: Uuid,
    campaign_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct BusinessPayload {
    business_id: Uuid,
}

/// Run one leased item to completion or failure.
pub async fn process_item(deps: &EngineDeps, item: WorkItem) {
    let kind = item.kind();
    let item_id = item.id;

    tracing::debug!(item_id = %item_id, kind = %kind, attempts = item.attempts, "Processing work item");

    let result = dispatch(deps, &item).await;

    match result {
        Ok(()) => {
            // Handlers that commit transitions complete the item inside the
            // transaction; completing again is a harmless no-op.
            if let Err(err) = deps.queue.complete(item_id).await {
                tracing::error!(item_id = %item_id, error = %err, "Failed to complete work item");
            }
        }
        Err(failure) => {
            tracing::warn!(
                item_id = %item_id,
                kind = %kind,
                retryable = failure.retryable,
                error = %failure.error,
                "Work item failed"
            );

            match deps
                .queue
                .fail(item_id, &failure.error.to_string(), failure.retryable)
                .await
            {
                Ok(true) => on_dead_letter(deps, &item, &failure).await,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(item_id = %item_id, error = %err, "Failed to record work-item failure");
                }
            }
        }
    }
}

async fn dispatch(deps: &EngineDeps, item: &WorkItem) -> Result<(), WorkFailure> {
    match item.kind() {
        WorkKind::ScrapeZone => {
            let payload: ZonePayload = parse_payload(&item.payload)?;
            scrape::run_scrape(deps, payload.zone_id, payload.campaign_id, item.id).await
        }
        WorkKind::ValidateBusiness => {
            let payload: BusinessPayload = parse_payload(&item.payload)?;
            crate::disposition::run_validation(deps, payload.business_id, item.id).await
        }
        WorkKind::DiscoverWebsite => {
            let payload: BusinessPayload = parse_payload(&item.payload)?;
            crate::discovery::run_discovery(deps, payload.business_id, item.id).await
        }
        WorkKind::SubmitGeneration => {
            let payload: BusinessPayload = parse_payload(&item.payload)?;
            crate::submitter::run_submit(deps, payload.business_id, item.id).await
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: &serde_json::Value,
) -> Result<T, WorkFailure> {
    serde_json::from_value(payload.clone())
        .map_err(|e| WorkFailure::permanent(anyhow::anyhow!("malformed payload: {e}")))
}

/// Terminal failure bookkeeping: record the error on the affected business
/// or zone so operators see it in campaign status.
async fn on_dead_letter(deps: &EngineDeps, item: &WorkItem, failure: &WorkFailure) {
    let error_text = failure.error.to_string();

    match item.kind() {
        WorkKind::ScrapeZone => {
            if let Ok(payload) = serde_json::from_value::<ZonePayload>(item.payload.clone()) {
                if let Err(err) = Zone::fail(payload.zone_id, &error_text, &deps.pool).await {
                    tracing::error!(zone_id = %payload.zone_id, error = %err, "Failed to mark zone failed");
                }
            }
        }
        WorkKind::ValidateBusiness | WorkKind::DiscoverWebsite => {
            if let Ok(payload) = serde_json::from_value::<BusinessPayload>(item.payload.clone()) {
                if let Err(err) =
                    Business::mark_error(payload.business_id, &error_text, &deps.pool).await
                {
                    tracing::error!(business_id = %payload.business_id, error = %err, "Failed to mark business errored");
                }
            }
        }
        // A failed hand-off leaves the business in confirmed_no_website for
        // manual resubmission; nothing to mark.
        WorkKind::SubmitGeneration => {}
    }
}
