//! Projection error types.

use thiserror::Error;

/// Errors that can occur while projecting events or querying the read model.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The message is not a valid event envelope, or its data does not
    /// match its event type.
    #[error("Event decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The read model store failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The read model store failed for a reason other than the database.
    #[error("Read model store error: {0}")]
    Store(String),

    /// The broker failed to subscribe or receive.
    #[error("Broker error: {0}")]
    Broker(#[from] broker::BrokerError),

    /// Reading the outbox log failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
