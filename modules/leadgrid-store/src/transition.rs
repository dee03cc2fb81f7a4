//! Atomic application of a disposition transition.
//!
//! Every state change commits in one transaction that updates the business
//! row, appends to the metadata audit trail, writes the validation record,
//! and enqueues the follow-up work item (or completes the current one). No
//! other worker can observe a business whose next scheduled action is
//! missing.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use leadgrid_common::{
    DiscoveryAttempt, ValidationEntry, ValidationStatus, WebsiteMetadata, WebsiteSource,
};

use crate::business::Business;
use crate::error::{Result, StoreError};
use crate::queue::{NewWorkItem, Queue};
use crate::validation_record::{NewValidationRecord, ValidationRecord};

/// What happens to the candidate URL in this transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlChange {
    Keep,
    Clear,
    Set(String),
}

pub struct TransitionCommit {
    pub business_id: Uuid,
    /// The state the engine observed when deciding. A mismatch at commit
    /// time means another worker got here first; the commit aborts as an
    /// invariant violation rather than applying a stale decision.
    pub expected_from: ValidationStatus,
    pub to: ValidationStatus,
    pub url_change: UrlChange,
    pub source: Option<WebsiteSource>,
    pub history_entry: Option<ValidationEntry>,
    pub discovery_attempt: Option<(String, DiscoveryAttempt)>,
    pub note: Option<String>,
    pub quality_score: Option<i32>,
    pub validation_record: Option<NewValidationRecord>,
    pub follow_up: Option<NewWorkItem>,
    /// Work item to complete in the same transaction.
    pub complete_item: Option<Uuid>,
}

impl TransitionCommit {
    pub fn new(business_id: Uuid, from: ValidationStatus, to: ValidationStatus) -> Self {
        Self {
            business_id,
            expected_from: from,
            to,
            url_change: UrlChange::Keep,
            source: None,
            history_entry: None,
            discovery_attempt: None,
            note: None,
            quality_score: None,
            validation_record: None,
            follow_up: None,
            complete_item: None,
        }
    }

    /// Apply the transition atomically. Returns the updated business row.
    pub async fn apply(self, pool: &PgPool, queue: &Queue) -> Result<Business> {
        let mut tx = pool.begin().await?;

        // Row lock on the business serializes concurrent pipeline stages.
        let business = sqlx::query_as::<_, Business>(
            "SELECT * FROM businesses WHERE id = $1 FOR UPDATE",
        )
        .bind(self.business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("business {}", self.business_id)))?;

        if business.status() != self.expected_from {
            return Err(StoreError::InvariantViolation(format!(
                "business {} is {} not {}; refusing transition to {}",
                self.business_id,
                business.status(),
                self.expected_from,
                self.to,
            )));
        }

        let mut metadata: WebsiteMetadata =
            serde_json::from_value(business.website_metadata.clone()).unwrap_or_default();

        if let Some(entry) = self.history_entry {
            metadata.validation_history.push(entry);
        }
        if let Some((method, attempt)) = self.discovery_attempt {
            metadata.discovery_attempts.insert(method, attempt);
        }
        if let Some(note) = self.note {
            metadata.notes.push(note);
        }
        if let Some(source) = self.source {
            metadata.source = Some(source);
            metadata.source_timestamp = Some(Utc::now());
        }

        let new_url = match &self.url_change {
            UrlChange::Keep => business.website_url.clone(),
            UrlChange::Clear => None,
            UrlChange::Set(url) => Some(url.clone()),
        };

        let updated = sqlx::query_as::<_, Business>(
            r#"
            UPDATE businesses
            SET website_validation_status = $2,
                website_url = $3,
                website_metadata = $4,
                quality_score = COALESCE($5, quality_score),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.business_id)
        .bind(self.to.to_string())
        .bind(&new_url)
        .bind(serde_json::to_value(&metadata)?)
        .bind(self.quality_score)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(record) = self.validation_record {
            ValidationRecord::insert_with(&record, &mut *tx).await?;
        }

        if let Some(item) = self.follow_up {
            queue.enqueue_with(&mut *tx, item).await?;
        }

        if let Some(item_id) = self.complete_item {
            queue.complete_with(&mut *tx, item_id).await?;
        }

        tx.commit().await?;

        tracing::info!(
            business_id = %self.business_id,
            from = %self.expected_from,
            to = %self.to,
            "Disposition transition committed"
        );

        Ok(updated)
    }
}
