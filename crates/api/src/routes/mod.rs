//! HTTP route handlers.

pub mod admin;
pub mod campaigns;
pub mod health;
pub mod metrics;
pub mod outbox;

use common::AggregateId;

use crate::error::ApiError;

/// Parses a path or body UUID into an aggregate ID.
pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    AggregateId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID '{id}': {e}")))
}
