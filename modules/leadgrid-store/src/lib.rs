pub mod business;
pub mod campaign;
pub mod error;
pub mod queue;
pub mod transition;
pub mod validation_record;
pub mod zone;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use business::{Business, NewBusiness};
pub use campaign::{Campaign, NewCampaign};
pub use error::{Result, StoreError};
pub use queue::{NewWorkItem, Queue, WorkItem};
pub use transition::{TransitionCommit, UrlChange};
pub use validation_record::{NewValidationRecord, ValidationRecord};
pub use zone::{CampaignProgress, NewZone, Zone, ZoneCounts};

/// Run the embedded SQL migrations from the workspace-root migrations dir.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(e.into()))?;
    Ok(())
}
