//! Domain error types.

use common::AggregateId;
use outbox::OutboxError;
use thiserror::Error;

use crate::campaign::CampaignError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The aggregate does not exist.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// A create command targeted an ID that is already taken.
    #[error("Aggregate already exists: {0}")]
    AlreadyExists(AggregateId),

    /// The campaign rejected the command.
    #[error("Campaign error: {0}")]
    Campaign(CampaignError),

    /// An error occurred in the aggregate or outbox store.
    #[error("Store error: {0}")]
    Store(OutboxError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<OutboxError> for DomainError {
    fn from(e: OutboxError) -> Self {
        match e {
            OutboxError::AggregateAlreadyExists(id) => DomainError::AlreadyExists(id),
            other => DomainError::Store(other),
        }
    }
}

impl DomainError {
    /// Returns true when another writer changed the aggregate first.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::AlreadyExists(_)
                | DomainError::Store(OutboxError::ConcurrencyConflict { .. })
        )
    }
}
