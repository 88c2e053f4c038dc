//! Outbox dispatcher: moves committed outbox rows onto the message broker.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use broker::{BrokerError, CAMPAIGN_EVENTS, MessageBroker, Topic};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::{AggregateId, OutboxEvent, OutboxStore, Result};

/// Default number of rows claimed per pass.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Default pause between passes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Pause between two passes.
    pub interval: Duration,

    /// Maximum rows claimed per pass.
    pub batch_size: usize,

    /// Every row is published to each of these topics.
    pub topics: Vec<Topic>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            topics: vec![Topic::scoped(CAMPAIGN_EVENTS)],
        }
    }
}

impl DispatcherConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_topics(mut self, topics: Vec<Topic>) -> Self {
        self.topics = topics;
        self
    }
}

/// Why a row could not be published. Recorded on the row as `last_error`.
#[derive(Debug, Error)]
pub enum PublishFailure {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("{0}")]
    Broker(#[from] BrokerError),
}

/// Outcome of one dispatcher pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Rows claimed.
    pub claimed: usize,
    /// Rows marked PUBLISHED.
    pub published: usize,
    /// Rows marked FAILED.
    pub failed: usize,
    /// Rows left PENDING because an earlier row of the same aggregate failed
    /// in this pass.
    pub skipped: usize,
}

/// Polls the outbox and publishes pending rows to the broker.
///
/// Each pass claims a batch with skip-locked semantics, so any number of
/// dispatchers can share one outbox without publishing a row twice. Rows are
/// published keyed by aggregate ID in occurrence order. A failed publish marks
/// the row FAILED and is never retried here; an operator requeue puts it back.
///
/// Ordering is per aggregate and best effort: two dispatchers may still
/// publish consecutive rows of one aggregate concurrently.
pub struct OutboxDispatcher<S, B> {
    store: S,
    broker: B,
    config: DispatcherConfig,
}

impl<S, B> OutboxDispatcher<S, B>
where
    S: OutboxStore,
    B: MessageBroker,
{
    pub fn new(store: S, broker: B, config: DispatcherConfig) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs a single pass over the outbox.
    #[instrument(skip(self), fields(batch_size = self.config.batch_size))]
    pub async fn dispatch_batch(&self) -> Result<DispatchReport> {
        let started = Instant::now();
        let mut batch = self.store.claim_pending(self.config.batch_size).await?;
        let events = batch.events().to_vec();

        let mut report = DispatchReport {
            claimed: events.len(),
            ..Default::default()
        };
        let mut blocked: HashSet<AggregateId> = HashSet::new();

        for event in &events {
            if blocked.contains(&event.aggregate_id) {
                report.skipped += 1;
                continue;
            }

            match self.publish(event).await {
                Ok(()) => {
                    batch.mark_published(event.id, Utc::now()).await?;
                    report.published += 1;
                }
                Err(failure) => {
                    error!(
                        outbox_id = %event.id,
                        aggregate_id = %event.aggregate_id,
                        event_type = %event.event_type,
                        attempts = event.attempts + 1,
                        error = %failure,
                        "publish failed, outbox row marked FAILED"
                    );
                    batch.mark_failed(event.id, &failure.to_string()).await?;
                    blocked.insert(event.aggregate_id);
                    report.failed += 1;
                }
            }
        }

        batch.commit().await?;

        metrics::counter!("outbox_dispatch_batches_total").increment(1);
        metrics::counter!("outbox_events_published_total").increment(report.published as u64);
        metrics::counter!("outbox_events_failed_total").increment(report.failed as u64);
        metrics::histogram!("outbox_dispatch_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                published = report.published,
                failed = report.failed,
                skipped = report.skipped,
                "outbox batch dispatched"
            );
        }

        Ok(report)
    }

    async fn publish(&self, event: &OutboxEvent) -> std::result::Result<(), PublishFailure> {
        let envelope = event.envelope()?;
        let key = envelope.aggregate_id.to_string();

        for topic in &self.config.topics {
            self.broker
                .publish(topic, &key, event.payload.as_bytes())
                .await?;
            debug!(topic = %topic, outbox_id = %event.id, version = %envelope.version, "published");
        }
        Ok(())
    }

    /// Runs passes on the configured interval until `shutdown` turns true.
    ///
    /// The signal is checked between passes; a pass in progress always
    /// completes or rolls back as a whole.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            topics = ?self.config.topics.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "outbox dispatcher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.dispatch_batch().await {
                warn!(error = %e, "outbox pass aborted, rows stay pending");
            }
        }

        info!("outbox dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use broker::InMemoryBroker;

    use super::*;
    use crate::{
        AggregateChange, AggregateRecord, EventEnvelope, InMemoryStore, OutboxQuery, OutboxStatus,
        RequeueFilter, Version, WriteStore,
    };

    async fn seed(store: &InMemoryStore, id: AggregateId, versions: std::ops::RangeInclusive<i64>) {
        for version in versions {
            let envelope = EventEnvelope::builder()
                .event_type(if version == 1 { "CampaignCreated" } else { "CampaignPaused" })
                .aggregate_id(id)
                .version(Version::new(version))
                .data_raw(serde_json::json!({}))
                .try_build()
                .unwrap();
            let record =
                AggregateRecord::from_state(id, "Campaign", Version::new(version), &()).unwrap();
            let change = AggregateChange::new(record, Version::new(version - 1))
                .with_event(crate::OutboxEvent::pending("Campaign", &envelope).unwrap());
            store.commit(change).await.unwrap();
        }
    }

    fn dispatcher(
        store: &InMemoryStore,
        broker: &InMemoryBroker,
    ) -> OutboxDispatcher<InMemoryStore, InMemoryBroker> {
        OutboxDispatcher::new(store.clone(), broker.clone(), DispatcherConfig::default())
    }

    fn topic() -> Topic {
        Topic::scoped(CAMPAIGN_EVENTS)
    }

    #[tokio::test]
    async fn publishes_pending_rows_keyed_by_aggregate() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let id = AggregateId::new();
        seed(&store, id, 1..=2).await;

        let report = dispatcher(&store, &broker).dispatch_batch().await.unwrap();

        assert_eq!(report.published, 2);
        let messages = broker.published(&topic());
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.key == id.to_string()));
        let first = EventEnvelope::from_slice(&messages[0].payload).unwrap();
        assert_eq!(first.version, Version::first());
        assert_eq!(store.stats().await.unwrap().published, 2);
    }

    #[tokio::test]
    async fn published_rows_are_not_sent_again() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, AggregateId::new(), 1..=1).await;
        let dispatcher = dispatcher(&store, &broker);

        dispatcher.dispatch_batch().await.unwrap();
        let second = dispatcher.dispatch_batch().await.unwrap();

        assert_eq!(second.claimed, 0);
        assert_eq!(broker.published(&topic()).len(), 1);
    }

    #[tokio::test]
    async fn broker_outage_marks_rows_failed_without_retrying() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, AggregateId::new(), 1..=1).await;
        let dispatcher = dispatcher(&store, &broker);

        broker.set_available(false);
        let report = dispatcher.dispatch_batch().await.unwrap();
        assert_eq!(report.failed, 1);

        broker.set_available(true);
        let report = dispatcher.dispatch_batch().await.unwrap();
        assert_eq!(report.claimed, 0);

        let failed = store
            .query(OutboxQuery::with_status(OutboxStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 1);
        assert!(failed[0].last_error.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn requeued_rows_are_published_on_next_pass() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, AggregateId::new(), 1..=1).await;
        let dispatcher = dispatcher(&store, &broker);

        broker.set_available(false);
        dispatcher.dispatch_batch().await.unwrap();
        broker.set_available(true);

        store.requeue_failed(RequeueFilter::all()).await.unwrap();
        let report = dispatcher.dispatch_batch().await.unwrap();

        assert_eq!(report.published, 1);
        let row = &store.query(OutboxQuery::new()).await.unwrap()[0];
        assert_eq!(row.status, OutboxStatus::Published);
        assert_eq!(row.attempts, 1);
    }

    #[tokio::test]
    async fn malformed_payload_fails_only_its_own_row() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let broken = AggregateId::new();
        let healthy = AggregateId::new();
        seed(&store, broken, 1..=1).await;
        seed(&store, healthy, 1..=1).await;

        let row = store.query(OutboxQuery::for_aggregate(broken)).await.unwrap()[0].id;
        store.corrupt_payload(row, "{not json").await;

        let report = dispatcher(&store, &broker).dispatch_batch().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.published, 1);
        let failed = &store.query(OutboxQuery::for_aggregate(broken)).await.unwrap()[0];
        assert!(failed.last_error.as_deref().unwrap().starts_with("malformed payload"));
    }

    #[tokio::test]
    async fn later_rows_of_a_failed_aggregate_stay_pending() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let id = AggregateId::new();
        seed(&store, id, 1..=3).await;

        let first = store.query(OutboxQuery::for_aggregate(id)).await.unwrap()[0].id;
        store.corrupt_payload(first, "").await;

        let report = dispatcher(&store, &broker).dispatch_batch().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 2);
        assert!(broker.published(&topic()).is_empty());
        assert_eq!(store.stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn fans_out_to_every_configured_topic() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, AggregateId::new(), 1..=1).await;
        let content = Topic::scoped(broker::CONTENT_EVENTS);
        let config = DispatcherConfig::default().with_topics(vec![topic(), content.clone()]);

        OutboxDispatcher::new(store.clone(), broker.clone(), config)
            .dispatch_batch()
            .await
            .unwrap();

        assert_eq!(broker.published(&topic()).len(), 1);
        assert_eq!(broker.published(&content).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_dispatchers_publish_each_row_once() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        for _ in 0..40 {
            seed(&store, AggregateId::new(), 1..=1).await;
        }

        let config = DispatcherConfig::default().with_batch_size(7);
        let dispatchers: Vec<_> = (0..4)
            .map(|_| {
                Arc::new(OutboxDispatcher::new(
                    store.clone(),
                    broker.clone(),
                    config.clone(),
                ))
            })
            .collect();

        let mut handles = Vec::new();
        for dispatcher in &dispatchers {
            let dispatcher = Arc::clone(dispatcher);
            handles.push(tokio::spawn(async move {
                let mut published = 0;
                for _ in 0..10 {
                    published += dispatcher.dispatch_batch().await.unwrap().published;
                }
                published
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }

        assert_eq!(total, 40);
        let messages = broker.published(&topic());
        assert_eq!(messages.len(), 40);
        let unique: HashSet<_> = messages.iter().map(|m| m.key.clone()).collect();
        assert_eq!(unique.len(), 40);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, AggregateId::new(), 1..=1).await;
        let config = DispatcherConfig::default().with_interval(Duration::from_millis(10));
        let dispatcher = OutboxDispatcher::new(store.clone(), broker.clone(), config);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { dispatcher.run(rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
        assert_eq!(broker.published(&topic()).len(), 1);
    }
}
