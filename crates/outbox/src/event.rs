use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, CorrelationId, EventEnvelope};

/// Unique identifier for an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(Uuid);

impl OutboxId {
    /// Creates a new random outbox ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an outbox ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OutboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dispatch status of an outbox row.
///
/// Rows start `Pending`. The dispatcher moves them to `Published` or `Failed`;
/// only an operator requeue moves a `Failed` row back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    #[default]
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown outbox status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OutboxStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OutboxStatus::Pending),
            "PUBLISHED" => Ok(OutboxStatus::Published),
            "FAILED" => Ok(OutboxStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// One row of the outbox.
///
/// The payload is the full serialized [`EventEnvelope`], exactly as it is
/// published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: OutboxId,

    /// Insertion order, assigned by the store when the row is written.
    pub sequence: i64,

    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,

    /// Serialized event envelope (JSON text).
    pub payload: String,

    pub occurred_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub published_at: Option<DateTime<Utc>>,

    /// Number of failed publish attempts.
    pub attempts: i32,

    /// Reason of the most recent publish failure.
    pub last_error: Option<String>,

    pub correlation_id: Option<CorrelationId>,
}

impl OutboxEvent {
    /// Creates a pending row carrying `envelope`.
    pub fn pending(
        aggregate_type: impl Into<String>,
        envelope: &EventEnvelope,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: OutboxId::new(),
            sequence: 0,
            aggregate_id: envelope.aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: envelope.event_type.clone(),
            payload: serde_json::to_string(envelope)?,
            occurred_at: envelope.timestamp,
            status: OutboxStatus::Pending,
            published_at: None,
            attempts: 0,
            last_error: None,
            correlation_id: envelope.correlation_id(),
        })
    }

    /// Decodes the stored envelope.
    pub fn envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Version;

    fn envelope() -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("CampaignCreated")
            .aggregate_id(AggregateId::new())
            .version(Version::first())
            .data_raw(serde_json::json!({"name": "Summer Sale"}))
            .correlation_id(Some(CorrelationId::new()))
            .try_build()
            .unwrap()
    }

    #[test]
    fn pending_row_copies_envelope_fields() {
        let envelope = envelope();
        let row = OutboxEvent::pending("Campaign", &envelope).unwrap();

        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, 0);
        assert_eq!(row.aggregate_id, envelope.aggregate_id);
        assert_eq!(row.event_type, "CampaignCreated");
        assert_eq!(row.occurred_at, envelope.timestamp);
        assert_eq!(row.correlation_id, envelope.correlation_id());
        assert_eq!(row.envelope().unwrap(), envelope);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("failed".parse::<OutboxStatus>().unwrap(), OutboxStatus::Failed);
        assert_eq!("PUBLISHED".parse::<OutboxStatus>().unwrap(), OutboxStatus::Published);
        assert!("DONE".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_value(OutboxStatus::Pending).unwrap(),
            serde_json::json!("PENDING")
        );
    }
}
