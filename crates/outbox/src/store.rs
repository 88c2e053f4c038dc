use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use crate::{
    AggregateId, AggregateRecord, OutboxError, OutboxEvent, OutboxId, OutboxQuery, OutboxStats,
    RequeueFilter, Result, Version,
};

/// A mutation of one aggregate together with the outbox rows it produced.
///
/// This pair is the unit of atomicity: a store commits both or neither.
#[derive(Debug, Clone)]
pub struct AggregateChange {
    /// The aggregate state after the mutation.
    pub record: AggregateRecord,

    /// Version the aggregate had when it was loaded; `Version::initial()`
    /// for an aggregate that does not exist yet.
    pub expected_version: Version,

    /// Outbox rows produced by the mutation, in event order.
    pub events: Vec<OutboxEvent>,
}

impl AggregateChange {
    pub fn new(record: AggregateRecord, expected_version: Version) -> Self {
        Self {
            record,
            expected_version,
            events: Vec::new(),
        }
    }

    /// Adds an outbox row to the change.
    pub fn with_event(mut self, event: OutboxEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.record.aggregate_id
    }

    pub fn is_create(&self) -> bool {
        self.expected_version == Version::initial()
    }
}

/// Checks that a change is internally consistent before it is committed.
///
/// Every mutation produces at least one event, all rows belong to the
/// aggregate being written, and the new version is the expected version
/// advanced by one per event.
pub fn validate_change(change: &AggregateChange) -> Result<()> {
    if change.events.is_empty() {
        return Err(OutboxError::InvalidChange(
            "an aggregate mutation must produce at least one outbox row".to_string(),
        ));
    }

    let aggregate_id = change.aggregate_id();
    if let Some(stray) = change.events.iter().find(|e| e.aggregate_id != aggregate_id) {
        return Err(OutboxError::InvalidChange(format!(
            "outbox row {} belongs to aggregate {}, not {}",
            stray.id, stray.aggregate_id, aggregate_id
        )));
    }

    let expected_new_version = change.expected_version.as_i64() + change.events.len() as i64;
    if change.record.version.as_i64() != expected_new_version {
        return Err(OutboxError::InvalidChange(format!(
            "record version {} does not follow version {} after {} event(s)",
            change.record.version,
            change.expected_version,
            change.events.len()
        )));
    }

    Ok(())
}

/// Write side of the campaign store: aggregate state plus the outbox.
#[async_trait]
pub trait WriteStore: Send + Sync {
    /// Loads the current record of an aggregate.
    ///
    /// Returns None if the aggregate doesn't exist.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>>;

    /// Writes the aggregate record and appends its outbox rows in one
    /// transaction.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version is no longer
    /// `change.expected_version`, and with `AggregateAlreadyExists` if a
    /// create targets a taken ID. On any failure nothing is written.
    ///
    /// Returns the new version of the aggregate.
    async fn commit(&self, change: AggregateChange) -> Result<Version>;
}

/// A stream of outbox rows.
pub type OutboxStream = Pin<Box<dyn Stream<Item = Result<OutboxEvent>> + Send>>;

/// Dispatch side of the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claims up to `limit` PENDING rows, oldest first.
    ///
    /// Rows claimed by another open batch are skipped, so concurrent
    /// dispatchers never see the same row. Rows of an aggregate that has a
    /// FAILED row are not claimed until that row is requeued.
    async fn claim_pending(&self, limit: usize) -> Result<Box<dyn OutboxBatch>>;

    /// Promotes FAILED rows selected by `filter` back to PENDING.
    ///
    /// Returns the number of rows requeued.
    async fn requeue_failed(&self, filter: RequeueFilter) -> Result<u64>;

    /// Lists rows matching a query, in insertion order.
    async fn query(&self, query: OutboxQuery) -> Result<Vec<OutboxEvent>>;

    /// Counts rows per status.
    async fn stats(&self) -> Result<OutboxStats>;

    /// Streams every row in insertion order, regardless of status.
    async fn stream_all(&self) -> Result<OutboxStream>;
}

/// Rows claimed by one dispatcher pass.
///
/// Status changes are staged on the batch and become visible on `commit`.
/// Dropping the batch without committing discards them and releases the rows.
#[async_trait]
pub trait OutboxBatch: Send {
    /// The claimed rows, oldest first.
    fn events(&self) -> &[OutboxEvent];

    /// Marks a row PUBLISHED.
    async fn mark_published(&mut self, id: OutboxId, published_at: DateTime<Utc>) -> Result<()>;

    /// Marks a row FAILED, incrementing its attempt counter.
    async fn mark_failed(&mut self, id: OutboxId, error: &str) -> Result<()>;

    /// Makes the staged status changes durable and releases the rows.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// A store that can serve both the command side and the dispatcher.
pub trait CampaignStore: WriteStore + OutboxStore {}

impl<T: WriteStore + OutboxStore + ?Sized> CampaignStore for T {}

#[async_trait]
impl<S: WriteStore + ?Sized> WriteStore for std::sync::Arc<S> {
    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>> {
        (**self).load(aggregate_id).await
    }

    async fn commit(&self, change: AggregateChange) -> Result<Version> {
        (**self).commit(change).await
    }
}

#[async_trait]
impl<S: OutboxStore + ?Sized> OutboxStore for std::sync::Arc<S> {
    async fn claim_pending(&self, limit: usize) -> Result<Box<dyn OutboxBatch>> {
        (**self).claim_pending(limit).await
    }

    async fn requeue_failed(&self, filter: RequeueFilter) -> Result<u64> {
        (**self).requeue_failed(filter).await
    }

    async fn query(&self, query: OutboxQuery) -> Result<Vec<OutboxEvent>> {
        (**self).query(query).await
    }

    async fn stats(&self) -> Result<OutboxStats> {
        (**self).stats().await
    }

    async fn stream_all(&self) -> Result<OutboxStream> {
        (**self).stream_all().await
    }
}
