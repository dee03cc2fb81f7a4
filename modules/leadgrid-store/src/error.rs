use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl StoreError {
    /// Invariant violations are retriable once per the failure policy;
    /// everything else follows the normal transient path.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, StoreError::InvariantViolation(_))
    }
}
