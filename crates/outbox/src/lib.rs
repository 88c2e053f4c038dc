//! Aggregate store with a transactional outbox.
//!
//! A command commits the new aggregate state and the outbox rows describing
//! the change in one transaction ([`WriteStore::commit`]). The
//! [`OutboxDispatcher`] later claims pending rows ([`OutboxStore::claim_pending`]),
//! publishes them to the broker and records the outcome on each row.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{AggregateId, CorrelationId, EventEnvelope, Version};
pub use dispatcher::{DispatchReport, DispatcherConfig, OutboxDispatcher, PublishFailure};
pub use error::{OutboxError, Result};
pub use event::{OutboxEvent, OutboxId, OutboxStatus, UnknownStatus};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{OutboxQuery, OutboxStats, RequeueFilter};
pub use record::AggregateRecord;
pub use store::{
    AggregateChange, CampaignStore, OutboxBatch, OutboxStore, OutboxStream, WriteStore,
    validate_change,
};
