use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, CorrelationId, Version};

/// Metadata key under which the correlation (saga) ID travels.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// The event envelope as it travels over the broker.
///
/// Serialized as a JSON object with exactly the fields
/// `event_type`, `aggregate_id`, `version`, `timestamp`, `data` and `metadata`.
/// The same document is stored verbatim as the outbox row payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The type tag of the event (e.g. "CampaignCreated").
    pub event_type: String,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The version of the aggregate after this event.
    pub version: Version,

    /// When the event occurred (ISO-8601 on the wire).
    pub timestamp: DateTime<Utc>,

    /// Event-specific fields.
    pub data: serde_json::Value,

    /// Additional metadata about the event.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Returns the correlation ID recorded in the metadata, if any.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.metadata
            .get(CORRELATION_ID_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Encodes the envelope as the JSON bytes published to the broker.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes an envelope from broker bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    version: Option<Version>,
    timestamp: Option<DateTime<Utc>>,
    data: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the version.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the data from a serializable value.
    pub fn data<T: Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Sets the data from a raw JSON value.
    pub fn data_raw(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Records the correlation ID in the metadata when one is given.
    pub fn correlation_id(self, correlation_id: Option<CorrelationId>) -> Self {
        match correlation_id {
            Some(id) => self.metadata(
                CORRELATION_ID_KEY,
                serde_json::Value::String(id.to_string()),
            ),
            None => self,
        }
    }

    /// Builds the envelope, returning None if event_type, aggregate_id,
    /// version or data is missing.
    pub fn try_build(self) -> Option<EventEnvelope> {
        Some(EventEnvelope {
            event_type: self.event_type?,
            aggregate_id: self.aggregate_id?,
            version: self.version?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            data: self.data?,
            metadata: self.metadata,
        })
    }
}
