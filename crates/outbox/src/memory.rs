use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AggregateId, AggregateRecord, OutboxError, OutboxEvent, OutboxId, OutboxQuery, OutboxStats,
    OutboxStatus, RequeueFilter, Result, Version,
    store::{AggregateChange, OutboxBatch, OutboxStore, OutboxStream, WriteStore, validate_change},
};

#[derive(Debug, Default)]
struct State {
    aggregates: HashMap<AggregateId, AggregateRecord>,
    outbox: Vec<OutboxEvent>,
    next_sequence: i64,
}

impl State {
    fn blocked_aggregates(&self) -> HashSet<AggregateId> {
        self.outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Failed)
            .map(|e| e.aggregate_id)
            .collect()
    }
}

/// In-memory aggregate and outbox store for testing and single-node runs.
///
/// Commits are applied under a single write lock, so the aggregate record and
/// its outbox rows become visible together. Claimed rows are tracked in a
/// separate set, which gives open batches the skip-locked behaviour of the
/// PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    claimed: Arc<Mutex<HashSet<OutboxId>>>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following commit fail with a storage error, as if the
    /// database went away mid-transaction.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of outbox rows.
    pub async fn outbox_len(&self) -> usize {
        self.state.read().await.outbox.len()
    }

    /// Returns the number of stored aggregates.
    pub async fn aggregate_count(&self) -> usize {
        self.state.read().await.aggregates.len()
    }

    /// Overwrites the payload of a row. Used to simulate corrupt rows.
    pub async fn corrupt_payload(&self, id: OutboxId, payload: impl Into<String>) {
        if let Some(row) = self.state.write().await.outbox.iter_mut().find(|e| e.id == id) {
            row.payload = payload.into();
        }
    }

    fn claims(&self) -> MutexGuard<'_, HashSet<OutboxId>> {
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WriteStore for InMemoryStore {
    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>> {
        Ok(self.state.read().await.aggregates.get(&aggregate_id).cloned())
    }

    async fn commit(&self, change: AggregateChange) -> Result<Version> {
        validate_change(&change)?;

        let mut state = self.state.write().await;
        let aggregate_id = change.aggregate_id();

        match state.aggregates.get(&aggregate_id) {
            Some(_) if change.is_create() => {
                return Err(OutboxError::AggregateAlreadyExists(aggregate_id));
            }
            Some(current) if current.version != change.expected_version => {
                return Err(OutboxError::ConcurrencyConflict {
                    aggregate_id,
                    expected: change.expected_version,
                    actual: current.version,
                });
            }
            None if !change.is_create() => {
                return Err(OutboxError::ConcurrencyConflict {
                    aggregate_id,
                    expected: change.expected_version,
                    actual: Version::initial(),
                });
            }
            _ => {}
        }

        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(OutboxError::Storage(
                "transaction aborted before commit".to_string(),
            ));
        }

        let new_version = change.record.version;
        state.aggregates.insert(aggregate_id, change.record);
        for mut event in change.events {
            state.next_sequence += 1;
            event.sequence = state.next_sequence;
            state.outbox.push(event);
        }

        Ok(new_version)
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn claim_pending(&self, limit: usize) -> Result<Box<dyn OutboxBatch>> {
        let state = self.state.read().await;
        let blocked = state.blocked_aggregates();
        let mut claimed = self.claims();

        let mut candidates: Vec<&OutboxEvent> = state
            .outbox
            .iter()
            .filter(|e| e.is_pending())
            .filter(|e| !claimed.contains(&e.id))
            .filter(|e| !blocked.contains(&e.aggregate_id))
            .collect();
        candidates.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.sequence.cmp(&b.sequence))
        });

        let events: Vec<OutboxEvent> = candidates.into_iter().take(limit).cloned().collect();
        claimed.extend(events.iter().map(|e| e.id));

        Ok(Box::new(InMemoryBatch {
            store: self.clone(),
            events,
            staged: Vec::new(),
        }))
    }

    async fn requeue_failed(&self, filter: RequeueFilter) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut requeued = 0;
        for row in state
            .outbox
            .iter_mut()
            .filter(|e| e.status == OutboxStatus::Failed)
            .filter(|e| filter.matches(e.id, e.aggregate_id))
        {
            row.status = OutboxStatus::Pending;
            requeued += 1;
        }
        Ok(requeued)
    }

    async fn query(&self, query: OutboxQuery) -> Result<Vec<OutboxEvent>> {
        let state = self.state.read().await;
        let rows = state
            .outbox
            .iter()
            .filter(|e| query.status.is_none_or(|s| e.status == s))
            .filter(|e| query.aggregate_id.is_none_or(|id| e.aggregate_id == id))
            .filter(|e| {
                query
                    .event_type
                    .as_ref()
                    .is_none_or(|t| &e.event_type == t)
            })
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn stats(&self) -> Result<OutboxStats> {
        let state = self.state.read().await;
        let mut stats = OutboxStats::default();
        for row in &state.outbox {
            match row.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Published => stats.published += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn stream_all(&self) -> Result<OutboxStream> {
        use futures_util::stream;

        let rows = self.state.read().await.outbox.clone();
        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }
}

#[derive(Debug, Clone)]
enum StagedUpdate {
    Published(DateTime<Utc>),
    Failed(String),
}

struct InMemoryBatch {
    store: InMemoryStore,
    events: Vec<OutboxEvent>,
    staged: Vec<(OutboxId, StagedUpdate)>,
}

impl InMemoryBatch {
    fn ensure_claimed(&self, id: OutboxId) -> Result<()> {
        if self.events.iter().any(|e| e.id == id) {
            Ok(())
        } else {
            Err(OutboxError::InvalidChange(format!(
                "outbox row {id} is not part of this batch"
            )))
        }
    }
}

#[async_trait]
impl OutboxBatch for InMemoryBatch {
    fn events(&self) -> &[OutboxEvent] {
        &self.events
    }

    async fn mark_published(&mut self, id: OutboxId, published_at: DateTime<Utc>) -> Result<()> {
        self.ensure_claimed(id)?;
        self.staged.push((id, StagedUpdate::Published(published_at)));
        Ok(())
    }

    async fn mark_failed(&mut self, id: OutboxId, error: &str) -> Result<()> {
        self.ensure_claimed(id)?;
        self.staged.push((id, StagedUpdate::Failed(error.to_string())));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.store.state.write().await;
        for (id, update) in staged {
            let Some(row) = state.outbox.iter_mut().find(|e| e.id == id) else {
                continue;
            };
            match update {
                StagedUpdate::Published(at) => {
                    row.status = OutboxStatus::Published;
                    row.published_at = Some(at);
                }
                StagedUpdate::Failed(error) => {
                    row.status = OutboxStatus::Failed;
                    row.attempts += 1;
                    row.last_error = Some(error);
                }
            }
        }
        Ok(())
    }
}

impl Drop for InMemoryBatch {
    fn drop(&mut self) {
        let mut claimed = self.store.claims();
        for event in &self.events {
            claimed.remove(&event.id);
        }
    }
}
