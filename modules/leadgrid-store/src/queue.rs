//! Durable priority work queue on Postgres.
//!
//! Leasing uses `FOR UPDATE SKIP LOCKED` so concurrent workers never block
//! on or double-claim the same row. Completed items are deleted; exhausted
//! items move to `work_dead_letter` in the same transaction as the final
//! failure, so completed + dead-lettered always accounts for everything
//! enqueued.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use leadgrid_common::WorkKind;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkItem {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub dedup_key: String,
    pub priority: i32,
    pub scheduled_not_before: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub locked_by: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn kind(&self) -> WorkKind {
        self.kind.parse().unwrap_or(WorkKind::ScrapeZone)
    }
}

pub struct NewWorkItem {
    pub kind: WorkKind,
    pub payload: serde_json::Value,
    pub dedup_key: String,
    pub priority: i32,
    pub not_before: Option<DateTime<Utc>>,
}

impl NewWorkItem {
    pub fn new(kind: WorkKind, payload: serde_json::Value, dedup_key: impl Into<String>) -> Self {
        Self {
            kind,
            payload,
            dedup_key: dedup_key.into(),
            priority: 5,
            not_before: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Retry delay before attempt `attempts + 1`: exponential from `base`,
/// capped, without jitter. Callers add jitter at enqueue time.
pub fn backoff_delay(attempts: i32, base: Duration, cap: Duration) -> Duration {
    let exp = attempts.saturating_sub(1).clamp(0, 20) as u32;
    let raw = base.saturating_mul(2u32.saturating_pow(exp));
    raw.min(cap)
}

/// Apply ±25% jitter so synchronized failures don't retry in lockstep.
pub fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis() as f64;
    let factor = rand::rng().random_range(0.75..=1.25);
    Duration::from_millis((millis * factor) as u64)
}

#[derive(Clone)]
pub struct Queue {
    pool: PgPool,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl Queue {
    pub fn new(pool: PgPool, backoff_base: Duration, backoff_cap: Duration) -> Self {
        Self {
            pool,
            backoff_base,
            backoff_cap,
        }
    }

    /// Enqueue unless an unfinished item with the same (kind, dedup_key)
    /// already exists. Returns the new item id, or None on dedup no-op.
    pub async fn enqueue(&self, item: NewWorkItem) -> Result<Option<Uuid>> {
        self.enqueue_with(&self.pool, item).await
    }

    /// Enqueue on an arbitrary executor. Used inside transition
    /// transactions so the follow-up item becomes visible only on commit.
    pub async fn enqueue_with<'e, E>(&self, executor: E, item: NewWorkItem) -> Result<Option<Uuid>>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO work_items (kind, payload, dedup_key, priority, scheduled_not_before, max_attempts)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()), $6)
            ON CONFLICT (kind, dedup_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(item.kind.to_string())
        .bind(&item.payload)
        .bind(&item.dedup_key)
        .bind(item.priority)
        .bind(item.not_before)
        .bind(item.kind.default_max_attempts())
        .fetch_optional(executor)
        .await?;

        if id.is_none() {
            tracing::debug!(kind = %item.kind, dedup_key = %item.dedup_key, "Enqueue deduplicated");
        }
        Ok(id)
    }

    /// Atomically claim the highest-priority due item of one of the given
    /// kinds. The claimed item is invisible to other workers until the lease
    /// expires or the item is completed/failed.
    pub async fn lease(
        &self,
        kinds: &[WorkKind],
        lease_duration: Duration,
        worker_id: &str,
    ) -> Result<Option<WorkItem>> {
        let kind_strings: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        let lease_secs = lease_duration.as_secs() as i64;

        sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET locked_by = $1,
                lock_expires_at = NOW() + ($2 || ' seconds')::INTERVAL
            WHERE id = (
                SELECT id FROM work_items
                WHERE kind = ANY($3)
                  AND scheduled_not_before <= NOW()
                  AND (locked_by IS NULL OR lock_expires_at < NOW())
                ORDER BY priority DESC, scheduled_not_before ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(lease_secs.to_string())
        .bind(&kind_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Remove a finished item.
    pub async fn complete(&self, id: Uuid) -> Result<()> {
        self.complete_with(&self.pool, id).await
    }

    pub async fn complete_with<'e, E>(&self, executor: E, id: Uuid) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query("DELETE FROM work_items WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Record a failed attempt. Retryable failures under the attempt budget
    /// reschedule with jittered exponential backoff; everything else moves
    /// to the dead-letter pile. Returns true when the item was dead-lettered.
    pub async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let item = sqlx::query_as::<_, WorkItem>(
            "SELECT * FROM work_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("work item {id}")))?;

        let attempts = item.attempts + 1;

        if retryable && attempts < item.max_attempts {
            let delay = jittered(backoff_delay(attempts, self.backoff_base, self.backoff_cap));
            let not_before = Utc::now() + ChronoDuration::from_std(delay).unwrap_or_default();

            sqlx::query(
                r#"
                UPDATE work_items
                SET attempts = $2,
                    scheduled_not_before = $3,
                    locked_by = NULL,
                    lock_expires_at = NULL,
                    last_error = $4
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(attempts)
            .bind(not_before)
            .bind(error)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            tracing::warn!(item_id = %id, kind = %item.kind, attempts, error, "Work item rescheduled");
            Ok(false)
        } else {
            sqlx::query(
                r#"
                INSERT INTO work_dead_letter
                    (id, kind, payload, dedup_key, priority, attempts, max_attempts, last_error, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(&item.kind)
            .bind(&item.payload)
            .bind(&item.dedup_key)
            .bind(item.priority)
            .bind(attempts)
            .bind(item.max_attempts)
            .bind(error)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM work_items WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::error!(item_id = %id, kind = %item.kind, attempts, error, "Work item dead-lettered");
            Ok(true)
        }
    }

    /// Release leases whose expiry has passed (crashed or wedged workers).
    /// Returns how many items became leasable again.
    pub async fn reap_expired(&self) -> Result<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE work_items
            SET locked_by = NULL, lock_expires_at = NULL
            WHERE locked_by IS NOT NULL AND lock_expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows > 0 {
            tracing::warn!(count = rows, "Reaped expired work-item leases");
        }
        Ok(rows)
    }

    /// Whether any unfinished item exists for the given dedup key.
    pub async fn has_pending(&self, kind: WorkKind, dedup_key: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM work_items WHERE kind = $1 AND dedup_key = $2",
        )
        .bind(kind.to_string())
        .bind(dedup_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn pending_count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM work_items")
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn dead_letter_count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM work_dead_letter")
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_secs(30);
        let cap = Duration::from_secs(3600);
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(30));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(60));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(120));
        assert_eq!(backoff_delay(4, base, cap), Duration::from_secs(240));
    }

    #[test]
    fn backoff_caps_at_one_hour() {
        let base = Duration::from_secs(30);
        let cap = Duration::from_secs(3600);
        assert_eq!(backoff_delay(10, base, cap), cap);
        assert_eq!(backoff_delay(100, base, cap), cap);
    }

    #[test]
    fn zero_and_negative_attempts_use_base() {
        let base = Duration::from_secs(30);
        let cap = Duration::from_secs(3600);
        assert_eq!(backoff_delay(0, base, cap), base);
        assert_eq!(backoff_delay(-3, base, cap), base);
    }

    #[test]
    fn jitter_stays_within_quarter_band() {
        let delay = Duration::from_secs(100);
        for _ in 0..100 {
            let j = jittered(delay);
            assert!(j >= Duration::from_secs(75), "jitter too low: {j:?}");
            assert!(j <= Duration::from_secs(125), "jitter too high: {j:?}");
        }
    }
}
