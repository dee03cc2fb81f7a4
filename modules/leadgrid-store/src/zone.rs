use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use leadgrid_common::ZoneStatus;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Zone {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub zone_id: String,
    pub name: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_km: f64,
    pub priority: i32,
    pub status: String,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub raw_count: i32,
    pub saved_count: i32,
    pub with_website_count: i32,
    pub without_website_count: i32,
    pub queued_for_generation_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct NewZone {
    pub zone_id: String,
    pub name: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_km: f64,
    pub priority: i32,
}

/// Result counters recorded when a scrape completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneCounts {
    pub raw: i32,
    pub saved: i32,
    pub with_website: i32,
    pub without_website: i32,
}

/// Aggregated view for the campaign-status endpoint.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignProgress {
    pub total_zones: i64,
    pub pending: i64,
    pub scraping: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
    pub raw_total: i64,
    pub saved_total: i64,
    pub with_website_total: i64,
    pub without_website_total: i64,
    pub queued_for_generation_total: i64,
    pub avg_attempts: Option<f64>,
}

impl Zone {
    pub fn status(&self) -> ZoneStatus {
        self.status.parse().unwrap_or(ZoneStatus::Pending)
    }

    pub async fn create_many(
        campaign_id: Uuid,
        zones: &[NewZone],
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let mut created = Vec::with_capacity(zones.len());
        let mut tx = pool.begin().await?;
        for z in zones {
            let row = sqlx::query_as::<_, Self>(
                r#"
                INSERT INTO zones (campaign_id, zone_id, name, center_lat, center_lng, radius_km, priority)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(campaign_id)
            .bind(&z.zone_id)
            .bind(&z.name)
            .bind(z.center_lat)
            .bind(z.center_lng)
            .bind(z.radius_km)
            .bind(z.priority)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }
        tx.commit().await?;
        Ok(created)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM zones WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("zone {id}")))
    }

    pub async fn find_by_campaign(campaign_id: Uuid, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM zones WHERE campaign_id = $1 ORDER BY priority DESC, zone_id",
        )
        .bind(campaign_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Mark the zone as actively scraping and bump its attempt counter.
    /// Only legal from pending or failed (the retry edge).
    pub async fn begin_attempt(id: Uuid, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE zones
            SET status = 'scraping', last_attempt_at = NOW(), attempt_count = attempt_count + 1
            WHERE id = $1 AND status IN ('pending', 'failed')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| {
            StoreError::InvariantViolation(format!("zone {id} not eligible for scraping"))
        })
    }

    pub async fn complete(
        id: Uuid,
        counts: ZoneCounts,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE zones
            SET status = 'completed',
                raw_count = $2,
                saved_count = $3,
                with_website_count = $4,
                without_website_count = $5,
                error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(counts.raw)
        .bind(counts.saved)
        .bind(counts.with_website)
        .bind(counts.without_website)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn fail(id: Uuid, error: &str, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE zones SET status = 'failed', error_message = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn skip(id: Uuid, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE zones SET status = 'skipped' WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Bump the generation counter when a business in this zone is handed to
    /// the generator.
    pub async fn increment_generation_count(id: Uuid, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE zones SET queued_for_generation_count = queued_for_generation_count + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn progress(campaign_id: Uuid, pool: &PgPool) -> Result<CampaignProgress> {
        sqlx::query_as::<_, CampaignProgress>(
            r#"
            SELECT
                COUNT(*)                                            AS total_zones,
                COUNT(*) FILTER (WHERE status = 'pending')          AS pending,
                COUNT(*) FILTER (WHERE status = 'scraping')         AS scraping,
                COUNT(*) FILTER (WHERE status = 'completed')        AS completed,
                COUNT(*) FILTER (WHERE status = 'failed')           AS failed,
                COUNT(*) FILTER (WHERE status = 'skipped')          AS skipped,
                COALESCE(SUM(raw_count), 0)                         AS raw_total,
                COALESCE(SUM(saved_count), 0)                       AS saved_total,
                COALESCE(SUM(with_website_count), 0)                AS with_website_total,
                COALESCE(SUM(without_website_count), 0)             AS without_website_total,
                COALESCE(SUM(queued_for_generation_count), 0)       AS queued_for_generation_total,
                AVG(attempt_count)::DOUBLE PRECISION                AS avg_attempts
            FROM zones
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
