use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the aggregate and outbox store.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The aggregate was written by someone else since it was loaded.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// A create was attempted for an aggregate ID that is already taken.
    #[error("Aggregate already exists: {0}")]
    AggregateAlreadyExists(AggregateId),

    /// The change handed to `commit` is inconsistent.
    #[error("Invalid change: {0}")]
    InvalidChange(String),

    /// The storage backend failed.
    #[error("Storage failure: {0}")]
    Storage(String),

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

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
