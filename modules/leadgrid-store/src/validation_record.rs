use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// Full evidence-in / verdict-out record of one verifier run, kept for
/// reproducibility. Immutable after write.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ValidationRecord {
    pub id: Uuid,
    pub business_id: Uuid,
    pub url_evaluated: String,
    pub evidence_kind: String,
    pub evidence: serde_json::Value,
    pub verdict: serde_json::Value,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewValidationRecord {
    pub business_id: Uuid,
    pub url_evaluated: String,
    pub evidence_kind: String,
    pub evidence: serde_json::Value,
    pub verdict: serde_json::Value,
    pub model: String,
}

impl ValidationRecord {
    pub async fn insert_with<'e, E>(new: &NewValidationRecord, executor: E) -> Result<Uuid>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO validation_records
                (business_id, url_evaluated, evidence_kind, evidence, verdict, model)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(new.business_id)
        .bind(&new.url_evaluated)
        .bind(&new.evidence_kind)
        .bind(&new.evidence)
        .bind(&new.verdict)
        .bind(&new.model)
        .fetch_one(executor)
        .await?;
        Ok(id)
    }

    pub async fn find_for_business(business_id: Uuid, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM validation_records WHERE business_id = $1 ORDER BY created_at",
        )
        .bind(business_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
