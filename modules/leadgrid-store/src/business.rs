use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use leadgrid_common::{ValidationStatus, WebsiteMetadata};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Business {
    pub id: Uuid,
    pub external_listing_id: String,
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub website_url: Option<String>,
    pub website_validation_status: String,
    pub website_metadata: serde_json::Value,
    pub raw_listing_data: serde_json::Value,
    pub quality_score: Option<i32>,
    pub discovery_queued_at: Option<DateTime<Utc>>,
    pub discovery_completed_at: Option<DateTime<Utc>>,
    pub generation_queued_at: Option<DateTime<Utc>>,
    pub generation_completed_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub zone_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A provider record flattened to the business schema. Produced by the pure
/// normalization step; `raw_payload` is the untouched provider response.
#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub external_listing_id: String,
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub website_url: Option<String>,
    pub raw_payload: serde_json::Value,
}

impl Business {
    pub fn status(&self) -> ValidationStatus {
        self.website_validation_status
            .parse()
            .unwrap_or(ValidationStatus::Pending)
    }

    pub fn metadata(&self) -> WebsiteMetadata {
        serde_json::from_value(self.website_metadata.clone()).unwrap_or_default()
    }

    /// Upsert by external listing id. First sighting inserts; a re-scrape
    /// refreshes listing fields and appends the new raw payload to the audit
    /// array without touching disposition state. Returns the row and whether
    /// it was newly created.
    pub async fn upsert_from_listing(
        new: &NewBusiness,
        zone_id: Uuid,
        pool: &PgPool,
    ) -> Result<(Self, bool)> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO businesses
                (external_listing_id, name, category, address, city, region, country,
                 phone, latitude, longitude, rating, review_count, website_url,
                 raw_listing_data, zone_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    jsonb_build_array($14::jsonb), $15)
            ON CONFLICT (external_listing_id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                address = EXCLUDED.address,
                city = EXCLUDED.city,
                region = EXCLUDED.region,
                country = EXCLUDED.country,
                phone = EXCLUDED.phone,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                rating = EXCLUDED.rating,
                review_count = EXCLUDED.review_count,
                raw_listing_data = businesses.raw_listing_data || $14::jsonb,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&new.external_listing_id)
        .bind(&new.name)
        .bind(&new.category)
        .bind(&new.address)
        .bind(&new.city)
        .bind(&new.region)
        .bind(&new.country)
        .bind(&new.phone)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(new.rating)
        .bind(new.review_count)
        .bind(&new.website_url)
        .bind(&new.raw_payload)
        .bind(zone_id)
        .fetch_one(pool)
        .await?;

        // Fresh inserts get created_at = updated_at from the same statement;
        // the conflict branch always advances updated_at.
        let created = row.created_at == row.updated_at;
        Ok((row, created))
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM businesses WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("business {id}")))
    }

    pub async fn find_by_external_id(external_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM businesses WHERE external_listing_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn set_discovery_queued(id: Uuid, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE businesses SET discovery_queued_at = COALESCE(discovery_queued_at, NOW()) WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_discovery_completed(id: Uuid, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE businesses SET discovery_completed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Stamp the generation hand-off. Returns false when already queued, so
    /// the submitter stays idempotent per business.
    pub async fn try_set_generation_queued(id: Uuid, pool: &PgPool) -> Result<bool> {
        let rows = sqlx::query(
            "UPDATE businesses SET generation_queued_at = NOW() WHERE id = $1 AND generation_queued_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn set_generation_completed(id: Uuid, pool: &PgPool) -> Result<bool> {
        let rows = sqlx::query(
            "UPDATE businesses SET generation_completed_at = NOW() WHERE id = $1 AND generation_completed_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Record a pipeline failure: state moves to error and the failure is
    /// noted in the audit metadata. Used when a work item exhausts retries,
    /// outside the normal transition edges.
    pub async fn mark_error(id: Uuid, error: &str, pool: &PgPool) -> Result<()> {
        let mut tx = pool.begin().await?;

        let business = sqlx::query_as::<_, Self>(
            "SELECT * FROM businesses WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("business {id}")))?;

        let mut metadata = business.metadata();
        metadata.notes.push(format!("pipeline error: {error}"));

        sqlx::query(
            r#"
            UPDATE businesses
            SET website_validation_status = 'error',
                website_metadata = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(serde_json::to_value(&metadata)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Soft-retire a business after a later signal invalidates it.
    pub async fn archive(id: Uuid, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE businesses SET archived = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
