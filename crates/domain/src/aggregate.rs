//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::{AggregateId, EventEnvelope, Version};
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
///
/// Implementors are enums serialized with
/// `#[serde(tag = "event_type", content = "data")]`, so that the variant name
/// is the event type and the variant's fields are the envelope `data`.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Every event type this enum can decode.
    const EVENT_TYPES: &'static [&'static str];

    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns when the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Returns the event-specific fields as carried in the envelope `data`.
    fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Decodes the event carried by an envelope.
    ///
    /// Returns `Ok(None)` for event types this enum does not know, and an
    /// error when the type is known but the data does not match it.
    fn from_envelope(envelope: &EventEnvelope) -> Result<Option<Self>, serde_json::Error> {
        if !Self::EVENT_TYPES.contains(&envelope.event_type.as_str()) {
            return Ok(None);
        }
        let tagged = serde_json::json!({
            "event_type": envelope.event_type,
            "data": envelope.data,
        });
        serde_json::from_value(tagged).map(Some)
    }
}

/// Trait for aggregates persisted as a state document next to their version.
///
/// Aggregates:
/// - Decide which event a command produces, without side effects
/// - Apply events to update state (pure, deterministic)
/// - Carry a version that advances by exactly one per event
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync + Sized {
    /// The type of events this aggregate produces.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    ///
    /// Stored on the aggregate record and on every outbox row.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the current version of the aggregate.
    ///
    /// Version starts at 0 for a new aggregate and increments with each event.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the command handler after loading the stored record.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "event_type", content = "data")]
    enum TestEvent {
        TestCreated { name: String, at: DateTime<Utc> },
        TestUpdated { value: i32, at: DateTime<Utc> },
    }

    impl DomainEvent for TestEvent {
        const EVENT_TYPES: &'static [&'static str] = &["TestCreated", "TestUpdated"];

        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::TestCreated { .. } => "TestCreated",
                TestEvent::TestUpdated { .. } => "TestUpdated",
            }
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            match self {
                TestEvent::TestCreated { at, .. } | TestEvent::TestUpdated { at, .. } => *at,
            }
        }
    }

    fn envelope(event_type: &str, data: serde_json::Value) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type(event_type)
            .aggregate_id(AggregateId::new())
            .version(Version::first())
            .data_raw(data)
            .try_build()
            .unwrap()
    }

    #[test]
    fn test_to_data_strips_the_tag() {
        let at = Utc::now();
        let event = TestEvent::TestUpdated { value: 42, at };

        let data = event.to_data().unwrap();

        assert_eq!(data["value"], 42);
        assert!(data.get("event_type").is_none());
    }

    #[test]
    fn test_from_envelope_round_trips_data() {
        let event = TestEvent::TestCreated {
            name: "x".to_string(),
            at: Utc::now(),
        };
        let env = envelope(event.event_type(), event.to_data().unwrap());

        assert_eq!(TestEvent::from_envelope(&env).unwrap(), Some(event));
    }

    #[test]
    fn test_from_envelope_ignores_unknown_types() {
        let env = envelope("SomethingElse", serde_json::json!({}));
        assert_eq!(TestEvent::from_envelope(&env).unwrap(), None);
    }

    #[test]
    fn test_from_envelope_rejects_malformed_data() {
        let env = envelope("TestUpdated", serde_json::json!({"value": "nope"}));
        assert!(TestEvent::from_envelope(&env).is_err());
    }
}
