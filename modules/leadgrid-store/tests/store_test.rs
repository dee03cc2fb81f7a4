//! Business store guarantees against real Postgres: listing-id dedup, raw
//! payload audit accumulation, and atomic disposition transitions.

use std::time::Duration;

use chrono::Utc;
use leadgrid_common::{
    DiscoveryAttempt, ValidationEntry, ValidationStatus, WebsiteSource, WorkKind,
};
use leadgrid_store::testutil::postgres_container;
use leadgrid_store::{
    Business, Campaign, NewBusiness, NewCampaign, NewWorkItem, NewZone, Queue, StoreError,
    TransitionCommit, UrlChange, ValidationRecord, Zone,
};
use leadgrid_common::CampaignMode;
use sqlx::PgPool;
use uuid::Uuid;

fn queue(pool: &PgPool) -> Queue {
    Queue::new(pool.clone(), Duration::from_secs(30), Duration::from_secs(3600))
}

async fn seed_zone(pool: &PgPool) -> Zone {
    let campaign = Campaign::create(
        NewCampaign {
            country: "US".to_string(),
            region: "CA".to_string(),
            city: "Los Angeles".to_string(),
            category: "law firms".to_string(),
            mode: CampaignMode::Live,
            planner_mode: "uniform".to_string(),
            planner_response: None,
        },
        pool,
    )
    .await
    .unwrap();

    Zone::create_many(
        campaign.id,
        &[NewZone {
            zone_id: "grid-1-1".to_string(),
            name: "Los Angeles grid 1,1".to_string(),
            center_lat: 34.05,
            center_lng: -118.24,
            radius_km: 7.5,
            priority: 5,
        }],
        pool,
    )
    .await
    .unwrap()
    .remove(0)
}

fn listing(external_id: &str, payload: serde_json::Value) -> NewBusiness {
    NewBusiness {
        external_listing_id: external_id.to_string(),
        name: "Mollaei Law".to_string(),
        category: Some("law firm".to_string()),
        address: Some("11845 W Olympic Blvd".to_string()),
        city: Some("Los Angeles".to_string()),
        region: Some("CA".to_string()),
        country: Some("US".to_string()),
        phone: Some("+1 310-555-0199".to_string()),
        latitude: Some(34.03),
        longitude: Some(-118.44),
        rating: Some(4.9),
        review_count: Some(312),
        website_url: Some("https://mollaeilaw.com/".to_string()),
        raw_payload: payload,
    }
}

#[tokio::test]
async fn upsert_dedups_on_external_listing_id_and_appends_raw_payloads() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;

    let (first, created) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({"sighting": 1})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();
    assert!(created);

    let (second, created_again) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({"sighting": 2})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();
    assert!(!created_again, "re-scrape must update in place");
    assert_eq!(first.id, second.id);

    // Raw payloads accumulate, oldest first.
    let payloads = second.raw_listing_data.as_array().unwrap();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0]["sighting"], 1);
    assert_eq!(payloads[1]["sighting"], 2);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1, "no net new rows on re-scrape");
}

#[tokio::test]
async fn rescrape_does_not_touch_disposition_state() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;
    let q = queue(&pool);

    let (business, _) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();

    TransitionCommit::new(business.id, ValidationStatus::Pending, ValidationStatus::Validating)
        .apply(&pool, &q)
        .await
        .unwrap();

    let (after_rescrape, _) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();
    assert_eq!(after_rescrape.status(), ValidationStatus::Validating);
}

#[tokio::test]
async fn transition_commits_atomically_with_history_record_and_follow_up() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;
    let q = queue(&pool);

    let (business, _) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();

    TransitionCommit::new(business.id, ValidationStatus::Pending, ValidationStatus::Validating)
        .apply(&pool, &q)
        .await
        .unwrap();

    let mut commit = TransitionCommit::new(
        business.id,
        ValidationStatus::Validating,
        ValidationStatus::NeedsDiscovery,
    );
    commit.url_change = UrlChange::Clear;
    commit.source = Some(WebsiteSource::None);
    commit.history_entry = Some(ValidationEntry {
        timestamp: Utc::now(),
        url_evaluated: "https://www.yelp.com/biz/wander-cpa".to_string(),
        verdict: "missing".to_string(),
        confidence: 1.0,
        reasoning: "aggregator".to_string(),
        recommendation: "clear_url_and_mark_missing".to_string(),
        evidence_summary: "prescreen: blocked-host".to_string(),
    });
    commit.discovery_attempt = Some((
        "provider".to_string(),
        DiscoveryAttempt {
            attempted: true,
            timestamp: Utc::now(),
            found_url: None,
            verdict: Some("missing".to_string()),
        },
    ));
    commit.validation_record = Some(leadgrid_store::NewValidationRecord {
        business_id: business.id,
        url_evaluated: "https://www.yelp.com/biz/wander-cpa".to_string(),
        evidence_kind: "rendered_page".to_string(),
        evidence: serde_json::json!({"kind": "rendered_page"}),
        verdict: serde_json::json!({"verdict": "missing"}),
        model: "claude-haiku-4-5-20251001".to_string(),
    });
    commit.follow_up = Some(NewWorkItem::new(
        WorkKind::DiscoverWebsite,
        serde_json::json!({ "business_id": business.id }),
        business.id.to_string(),
    ));

    let updated = commit.apply(&pool, &q).await.unwrap();

    assert_eq!(updated.status(), ValidationStatus::NeedsDiscovery);
    assert_eq!(updated.website_url, None);

    let metadata = updated.metadata();
    assert_eq!(metadata.validation_history.len(), 1);
    assert_eq!(metadata.validation_history[0].verdict, "missing");
    assert!(metadata.discovery_attempts.contains_key("provider"));
    assert_eq!(metadata.source, Some(WebsiteSource::None));

    let records = ValidationRecord::find_for_business(business.id, &pool)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].evidence_kind, "rendered_page");

    // The follow-up item became visible with the commit.
    assert!(q
        .has_pending(WorkKind::DiscoverWebsite, &business.id.to_string())
        .await
        .unwrap());
}

#[tokio::test]
async fn stale_transition_is_refused_and_leaves_state_untouched() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;
    let q = queue(&pool);

    let (business, _) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();

    // Business is pending; a worker that still thinks it's validating is
    // acting on stale state.
    let err = TransitionCommit::new(
        business.id,
        ValidationStatus::Validating,
        ValidationStatus::ValidFromProvider,
    )
    .apply(&pool, &q)
    .await
    .unwrap_err();

    assert!(matches!(err, StoreError::InvariantViolation(_)));

    let reread = Business::find_by_id(business.id, &pool).await.unwrap();
    assert_eq!(reread.status(), ValidationStatus::Pending);
    assert!(reread.metadata().validation_history.is_empty());
}

#[tokio::test]
async fn history_is_append_only_across_transitions() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;
    let q = queue(&pool);

    let (business, _) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();

    TransitionCommit::new(business.id, ValidationStatus::Pending, ValidationStatus::Validating)
        .apply(&pool, &q)
        .await
        .unwrap();

    let entry = |url: &str, verdict: &str| ValidationEntry {
        timestamp: Utc::now(),
        url_evaluated: url.to_string(),
        verdict: verdict.to_string(),
        confidence: 0.9,
        reasoning: String::new(),
        recommendation: "keep_url".to_string(),
        evidence_summary: String::new(),
    };

    let mut first = TransitionCommit::new(
        business.id,
        ValidationStatus::Validating,
        ValidationStatus::NeedsDiscovery,
    );
    first.url_change = UrlChange::Clear;
    first.history_entry = Some(entry("https://yelp.com/biz/x", "missing"));
    first.apply(&pool, &q).await.unwrap();

    TransitionCommit::new(
        business.id,
        ValidationStatus::NeedsDiscovery,
        ValidationStatus::DiscoveryInProgress,
    )
    .apply(&pool, &q)
    .await
    .unwrap();

    let mut second = TransitionCommit::new(
        business.id,
        ValidationStatus::DiscoveryInProgress,
        ValidationStatus::Validating,
    );
    second.url_change = UrlChange::Set("https://wandercpa.com/".to_string());
    second.source = Some(WebsiteSource::Search);
    second.apply(&pool, &q).await.unwrap();

    let mut third = TransitionCommit::new(
        business.id,
        ValidationStatus::Validating,
        ValidationStatus::ValidFromSearch,
    );
    third.history_entry = Some(entry("https://wandercpa.com/", "valid"));
    let updated = third.apply(&pool, &q).await.unwrap();

    let history = updated.metadata().validation_history;
    assert_eq!(history.len(), 2);
    // Prefix preserved, order preserved.
    assert_eq!(history[0].url_evaluated, "https://yelp.com/biz/x");
    assert_eq!(history[0].verdict, "missing");
    assert_eq!(history[1].url_evaluated, "https://wandercpa.com/");
    assert_eq!(history[1].verdict, "valid");
}

#[tokio::test]
async fn generation_stamps_are_idempotent() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;

    let (business, _) = Business::upsert_from_listing(
        &listing("ChIJabc123", serde_json::json!({})),
        zone.id,
        &pool,
    )
    .await
    .unwrap();

    assert!(Business::try_set_generation_queued(business.id, &pool)
        .await
        .unwrap());
    assert!(!Business::try_set_generation_queued(business.id, &pool)
        .await
        .unwrap());

    assert!(Business::set_generation_completed(business.id, &pool)
        .await
        .unwrap());
    assert!(!Business::set_generation_completed(business.id, &pool)
        .await
        .unwrap());
}

#[tokio::test]
async fn zone_progress_aggregates_counts() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;

    Zone::begin_attempt(zone.id, &pool).await.unwrap();
    Zone::complete(
        zone.id,
        leadgrid_store::ZoneCounts {
            raw: 42,
            saved: 40,
            with_website: 25,
            without_website: 15,
        },
        &pool,
    )
    .await
    .unwrap();

    let progress = Zone::progress(zone.campaign_id, &pool).await.unwrap();
    assert_eq!(progress.total_zones, 1);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.raw_total, 42);
    assert_eq!(progress.with_website_total, 25);
    assert_eq!(progress.without_website_total, 15);
    assert_eq!(progress.avg_attempts, Some(1.0));
}

#[tokio::test]
async fn duplicate_zone_id_within_campaign_is_refused() {
    let (_pg, pool) = postgres_container().await;
    let zone = seed_zone(&pool).await;

    let result = Zone::create_many(
        zone.campaign_id,
        &[NewZone {
            zone_id: zone.zone_id.clone(),
            name: "dupe".to_string(),
            center_lat: 0.0,
            center_lng: 0.0,
            radius_km: 1.0,
            priority: 5,
        }],
        &pool,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn unknown_business_lookup_is_not_found() {
    let (_pg, pool) = postgres_container().await;
    let err = Business::find_by_id(Uuid::new_v4(), &pool).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
