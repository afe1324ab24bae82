use common::{AttemptId, PaymentId};
use thiserror::Error;

/// Errors that can occur when interacting with the payment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No attempt record exists for the ID.
    #[error("Attempt not found: {0}")]
    AttemptNotFound(AttemptId),

    /// No payment exists for the ID.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// A persisted value could not be mapped back into the domain model.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for payment store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
