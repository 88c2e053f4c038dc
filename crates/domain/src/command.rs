//! Command handling infrastructure.

use std::marker::PhantomData;

use common::{AggregateId, CorrelationId, EventEnvelope, Version};
use outbox::{AggregateChange, AggregateRecord, OutboxEvent, OutboxId, WriteStore};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new event.
    pub aggregate: A,

    /// The event that was generated and written to the outbox.
    pub event: A::Event,

    /// The envelope stored as the outbox row payload.
    pub envelope: EventEnvelope,

    /// The ID of the outbox row.
    pub outbox_id: OutboxId,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;

    /// Returns the correlation ID to carry on the produced event, if any.
    fn correlation_id(&self) -> Option<CorrelationId>;
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate record from the store
/// 2. Executing the command to produce one event
/// 3. Committing the new state and the outbox row in one transaction
pub struct CommandHandler<S, A>
where
    S: WriteStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: WriteStore,
    A: Aggregate,
{
    /// Creates a new command handler with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let Some(record) = self.store.load(aggregate_id).await? else {
            return Ok(None);
        };
        let version = record.version;
        let mut aggregate: A = record.into_state()?;
        aggregate.set_version(version);
        Ok(Some(aggregate))
    }

    /// Executes a command that creates a new aggregate.
    ///
    /// Fails with [`DomainError::AlreadyExists`] if the ID is taken.
    pub async fn create<F>(
        &self,
        aggregate_id: AggregateId,
        correlation_id: Option<CorrelationId>,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<A::Event, A::Error>,
        DomainError: From<A::Error>,
    {
        if self.store.load(aggregate_id).await?.is_some() {
            return Err(DomainError::AlreadyExists(aggregate_id));
        }
        self.commit(aggregate_id, correlation_id, A::default(), command_fn)
            .await
    }

    /// Executes a command against an existing aggregate.
    ///
    /// Fails with [`DomainError::AggregateNotFound`] if it doesn't exist.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        correlation_id: Option<CorrelationId>,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<A::Event, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load_existing(aggregate_id).await?.ok_or(
            DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id,
            },
        )?;
        self.commit(aggregate_id, correlation_id, aggregate, command_fn)
            .await
    }

    async fn commit<F>(
        &self,
        aggregate_id: AggregateId,
        correlation_id: Option<CorrelationId>,
        mut aggregate: A,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<A::Event, A::Error>,
        DomainError: From<A::Error>,
    {
        let current_version = aggregate.version();
        let event = command_fn(&aggregate)?;
        let new_version = current_version.next();

        let envelope = self.build_envelope(aggregate_id, new_version, correlation_id, &event)?;
        let row = OutboxEvent::pending(A::aggregate_type(), &envelope)?;
        let outbox_id = row.id;

        aggregate.apply(event.clone());
        aggregate.set_version(new_version);

        let record =
            AggregateRecord::from_state(aggregate_id, A::aggregate_type(), new_version, &aggregate)?;
        let change = AggregateChange::new(record, current_version).with_event(row);

        // Optimistic concurrency: the store rejects the change if another
        // writer moved the version since we loaded it.
        self.store.commit(change).await?;

        Ok(CommandResult {
            aggregate,
            event,
            envelope,
            outbox_id,
            new_version,
        })
    }

    /// Builds the event envelope for a domain event.
    fn build_envelope(
        &self,
        aggregate_id: AggregateId,
        version: Version,
        correlation_id: Option<CorrelationId>,
        event: &A::Event,
    ) -> Result<EventEnvelope, DomainError> {
        EventEnvelope::builder()
            .event_type(event.event_type())
            .aggregate_id(aggregate_id)
            .version(version)
            .timestamp(event.occurred_at())
            .data_raw(event.to_data()?)
            .correlation_id(correlation_id)
            .try_build()
            .ok_or_else(|| {
                DomainError::Serialization(serde::ser::Error::custom("incomplete event envelope"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use outbox::{InMemoryStore, OutboxQuery, OutboxStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
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

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct TestAggregate {
        id: Option<AggregateId>,
        name: String,
        value: i32,
        #[serde(skip)]
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("invalid value: {0}")]
        InvalidValue(i32),
    }

    impl Aggregate for TestAggregate {
        type Event = TestEvent;
        type Error = TestError;

        fn aggregate_type() -> &'static str {
            "TestAggregate"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TestEvent::TestCreated { name, .. } => {
                    if self.id.is_none() {
                        self.id = Some(AggregateId::new());
                    }
                    self.name = name;
                }
                TestEvent::TestUpdated { value, .. } => {
                    self.value = value;
                }
            }
        }
    }

    impl From<TestError> for DomainError {
        fn from(e: TestError) -> Self {
            DomainError::Serialization(serde::de::Error::custom(e.to_string()))
        }
    }

    fn created() -> Result<TestEvent, TestError> {
        Ok(TestEvent::TestCreated {
            name: "Test".to_string(),
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_create_writes_version_one_and_a_pending_row() {
        let store = InMemoryStore::new();
        let handler: CommandHandler<_, TestAggregate> = CommandHandler::new(store.clone());
        let aggregate_id = AggregateId::new();

        let result = handler
            .create(aggregate_id, None, |_| created())
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.aggregate.name, "Test");
        assert_eq!(result.envelope.version, Version::first());
        assert_eq!(result.envelope.data["name"], "Test");

        let rows = store
            .query(OutboxQuery::for_aggregate(aggregate_id))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, result.outbox_id);
        assert_eq!(rows[0].aggregate_type, "TestAggregate");
    }

    #[tokio::test]
    async fn test_execute_advances_version_by_one() {
        let store = InMemoryStore::new();
        let handler: CommandHandler<_, TestAggregate> = CommandHandler::new(store);
        let aggregate_id = AggregateId::new();
        handler
            .create(aggregate_id, None, |_| created())
            .await
            .unwrap();

        let result = handler
            .execute(aggregate_id, None, |_| {
                Ok(TestEvent::TestUpdated {
                    value: 42,
                    at: Utc::now(),
                })
            })
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.value, 42);

        let loaded = handler.load_existing(aggregate_id).await.unwrap().unwrap();
        assert_eq!(loaded.version(), Version::new(2));
        assert_eq!(loaded.value, 42);
    }

    #[tokio::test]
    async fn test_rejected_command_writes_nothing() {
        let store = InMemoryStore::new();
        let handler: CommandHandler<_, TestAggregate> = CommandHandler::new(store.clone());
        let aggregate_id = AggregateId::new();
        handler
            .create(aggregate_id, None, |_| created())
            .await
            .unwrap();

        let result = handler
            .execute(aggregate_id, None, |_| Err(TestError::InvalidValue(-1)))
            .await;

        assert!(result.is_err());
        assert_eq!(store.outbox_len().await, 1);
        let loaded = handler.load_existing(aggregate_id).await.unwrap().unwrap();
        assert_eq!(loaded.version(), Version::first());
    }

    #[tokio::test]
    async fn test_execute_on_missing_aggregate_is_not_found() {
        let handler: CommandHandler<_, TestAggregate> = CommandHandler::new(InMemoryStore::new());

        let result = handler
            .execute(AggregateId::new(), None, |_| created())
            .await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
    }

    #[tokio::test]
    async fn test_create_with_taken_id_is_rejected() {
        let store = InMemoryStore::new();
        let handler: CommandHandler<_, TestAggregate> = CommandHandler::new(store.clone());
        let aggregate_id = AggregateId::new();
        handler
            .create(aggregate_id, None, |_| created())
            .await
            .unwrap();

        let result = handler.create(aggregate_id, None, |_| created()).await;

        assert!(matches!(result, Err(DomainError::AlreadyExists(id)) if id == aggregate_id));
        assert_eq!(store.outbox_len().await, 1);
    }

    #[tokio::test]
    async fn test_correlation_id_reaches_envelope_and_row() {
        let store = InMemoryStore::new();
        let handler: CommandHandler<_, TestAggregate> = CommandHandler::new(store.clone());
        let aggregate_id = AggregateId::new();
        let correlation = CorrelationId::new();

        let result = handler
            .create(aggregate_id, Some(correlation), |_| created())
            .await
            .unwrap();

        assert_eq!(result.envelope.correlation_id(), Some(correlation));
        let rows = store
            .query(OutboxQuery::for_aggregate(aggregate_id))
            .await
            .unwrap();
        assert_eq!(rows[0].correlation_id, Some(correlation));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_aggregate_untouched() {
        let store = InMemoryStore::new();
        let handler: CommandHandler<_, TestAggregate> = CommandHandler::new(store.clone());
        store.set_fail_commits(true);

        let result = handler
            .create(AggregateId::new(), None, |_| created())
            .await;

        assert!(matches!(result, Err(DomainError::Store(_))));
        assert_eq!(store.aggregate_count().await, 0);
        assert_eq!(store.outbox_len().await, 0);
    }
}
