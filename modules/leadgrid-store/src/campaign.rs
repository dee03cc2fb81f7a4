use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use leadgrid_common::{CampaignMode, CampaignStatus};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub country: String,
    pub region: String,
    pub city: String,
    pub category: String,
    pub mode: String,
    pub status: String,
    pub planner_mode: String,
    pub planner_response: Option<serde_json::Value>,
    pub requested_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub struct NewCampaign {
    pub country: String,
    pub region: String,
    pub city: String,
    pub category: String,
    pub mode: CampaignMode,
    pub planner_mode: String,
    pub planner_response: Option<serde_json::Value>,
}

impl Campaign {
    pub fn mode(&self) -> CampaignMode {
        self.mode.parse().unwrap_or(CampaignMode::Live)
    }

    pub fn status(&self) -> CampaignStatus {
        self.status.parse().unwrap_or(CampaignStatus::Active)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == CampaignStatus::Cancelled
    }

    pub async fn create(new: NewCampaign, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO campaigns (country, region, city, category, mode, planner_mode, planner_response)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new.country)
        .bind(&new.region)
        .bind(&new.city)
        .bind(&new.category)
        .bind(new.mode.to_string())
        .bind(&new.planner_mode)
        .bind(&new.planner_response)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("campaign {id}")))
    }

    /// An active campaign for the same geography+category created within the
    /// given window. Used for the duplicate-submission (409) check.
    pub async fn find_recent_duplicate(
        country: &str,
        region: &str,
        city: &str,
        category: &str,
        within: chrono::Duration,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM campaigns
            WHERE country = $1 AND region = $2 AND city = $3 AND category = $4
              AND status = 'active'
              AND created_at > NOW() - $5::INTERVAL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(country)
        .bind(region)
        .bind(city)
        .bind(category)
        .bind(format!("{} seconds", within.num_seconds()))
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn cancel(id: Uuid, pool: &PgPool) -> Result<()> {
        let rows = sqlx::query("UPDATE campaigns SET status = 'cancelled' WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(StoreError::NotFound(format!("campaign {id}")));
        }
        Ok(())
    }
}
