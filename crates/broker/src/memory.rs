use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{BrokerError, Delivery, MessageBroker, Result, Subscription, Topic};

/// Default delay before a nacked message is handed out again.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_millis(500);

/// A message as stored on an in-memory topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Retained messages of one topic. `base` is the offset of the first
/// retained message; offsets stay stable when the front is compacted away.
#[derive(Debug, Default)]
struct TopicLog {
    base: usize,
    messages: VecDeque<PublishedMessage>,
    subscriptions: HashMap<String, SubscriptionCursor>,
}

impl TopicLog {
    fn get(&self, offset: usize) -> Option<&PublishedMessage> {
        offset
            .checked_sub(self.base)
            .and_then(|index| self.messages.get(index))
    }

    fn end(&self) -> usize {
        self.base + self.messages.len()
    }

    fn cursor(&mut self, subscription: &str) -> &mut SubscriptionCursor {
        let base = self.base;
        self.subscriptions
            .entry(subscription.to_string())
            .or_insert_with(|| SubscriptionCursor::starting_at(base))
    }

    /// Drops messages every subscription has settled. Without subscriptions
    /// the log is kept whole so a late subscriber still sees every message.
    fn compact(&mut self) {
        let Some(low) = self
            .subscriptions
            .values()
            .map(SubscriptionCursor::low_watermark)
            .min()
        else {
            return;
        };
        let settled = low.saturating_sub(self.base).min(self.messages.len());
        self.messages.drain(..settled);
        self.base += settled;
    }
}

#[derive(Debug, Default)]
struct SubscriptionCursor {
    next_offset: usize,
    in_flight: HashMap<usize, u32>,
    redeliveries: VecDeque<Redelivery>,
}

impl SubscriptionCursor {
    fn starting_at(offset: usize) -> Self {
        Self {
            next_offset: offset,
            ..Self::default()
        }
    }

    /// Lowest offset this subscription may still hand out.
    fn low_watermark(&self) -> usize {
        self.in_flight
            .keys()
            .copied()
            .chain(self.redeliveries.iter().map(|r| r.offset))
            .fold(self.next_offset, usize::min)
    }
}

#[derive(Debug)]
struct Redelivery {
    offset: usize,
    redelivery_count: u32,
    available_at: Instant,
}

enum Next {
    Ready(Delivery),
    Idle { redelivery_at: Option<Instant> },
}

#[derive(Debug)]
struct Inner {
    topics: Mutex<HashMap<String, TopicLog>>,
    notify: Notify,
    available: AtomicBool,
    redelivery_delay: Duration,
}

/// In-process broker with durable shared subscriptions.
///
/// Topics are append-only logs. A subscription starts at the earliest retained
/// message, hands each message to exactly one of its handles and redelivers
/// nacked messages after the redelivery delay. Once every subscription of a
/// topic has acked a message it is dropped from the log. Cloning yields
/// another handle to the same broker.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_redelivery_delay(DEFAULT_REDELIVERY_DELAY)
    }

    /// Creates a broker that redelivers nacked messages after `delay`.
    pub fn with_redelivery_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                available: AtomicBool::new(true),
                redelivery_delay: delay,
            }),
        }
    }

    /// Simulates an outage: while unavailable, every publish fails.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Returns the messages still retained on `topic`, in publish order.
    pub fn published(&self, topic: &Topic) -> Vec<PublishedMessage> {
        self.inner
            .lock()
            .get(&topic.to_string())
            .map(|log| log.messages.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        // A panic while holding the lock cannot leave a log half-written.
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next(&self, topic: &str, subscription: &str) -> Next {
        let mut topics = self.lock();
        let log = topics.entry(topic.to_string()).or_default();
        let end = log.end();
        let now = Instant::now();

        let cursor = log.cursor(subscription);
        let redelivery = cursor
            .redeliveries
            .front()
            .filter(|r| r.available_at <= now)
            .map(|r| (r.offset, r.redelivery_count));
        let (offset, redelivery_count) = match redelivery {
            Some(due) => {
                cursor.redeliveries.pop_front();
                due
            }
            None if cursor.next_offset < end => {
                cursor.next_offset += 1;
                (cursor.next_offset - 1, 0)
            }
            None => {
                return Next::Idle {
                    redelivery_at: cursor.redeliveries.front().map(|r| r.available_at),
                };
            }
        };
        cursor.in_flight.insert(offset, redelivery_count);

        match log.get(offset) {
            Some(message) => Next::Ready(Delivery {
                message_id: offset.to_string(),
                key: message.key.clone(),
                payload: message.payload.clone(),
                redelivery_count,
            }),
            // Unreachable while the watermark holds the offset back.
            None => Next::Idle {
                redelivery_at: None,
            },
        }
    }

    fn settle(
        &self,
        topic: &str,
        subscription: &str,
        delivery: &Delivery,
        redeliver: bool,
    ) -> Result<()> {
        let offset: usize = delivery
            .message_id
            .parse()
            .map_err(|_| BrokerError::Acknowledge {
                message_id: delivery.message_id.clone(),
                reason: "not an in-memory message id".to_string(),
            })?;

        let mut topics = self.lock();
        let Some(log) = topics.get_mut(topic) else {
            return Ok(());
        };
        let Some(cursor) = log.subscriptions.get_mut(subscription) else {
            return Ok(());
        };

        // Settling twice is a no-op.
        let Some(count) = cursor.in_flight.remove(&offset) else {
            return Ok(());
        };

        if redeliver {
            cursor.redeliveries.push_back(Redelivery {
                offset,
                redelivery_count: count + 1,
                available_at: Instant::now() + self.redelivery_delay,
            });
        }
        log.compact();
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &Topic, key: &str, payload: &[u8]) -> Result<()> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(format!(
                "in-memory broker is down, cannot publish to {topic}"
            )));
        }

        self.inner
            .lock()
            .entry(topic.to_string())
            .or_default()
            .messages
            .push_back(PublishedMessage {
                key: key.to_string(),
                payload: payload.to_vec(),
            });
        self.inner.notify.notify_waiters();

        tracing::trace!(topic = %topic, key, "message published");
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic, subscription: &str) -> Result<Box<dyn Subscription>> {
        self.inner
            .lock()
            .entry(topic.to_string())
            .or_default()
            .cursor(subscription);

        Ok(Box::new(InMemorySubscription {
            inner: Arc::clone(&self.inner),
            topic: topic.to_string(),
            name: subscription.to_string(),
        }))
    }
}

/// Handle on a shared subscription of an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemorySubscription {
    inner: Arc<Inner>,
    topic: String,
    name: String,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = match self.inner.next(&self.topic, &self.name) {
                Next::Ready(delivery) => return Ok(Some(delivery)),
                Next::Idle { redelivery_at } => {
                    redelivery_at.map_or(deadline, |at| at.min(deadline))
                }
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        self.inner.settle(&self.topic, &self.name, delivery, false)
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<()> {
        self.inner.settle(&self.topic, &self.name, delivery, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    fn topic() -> Topic {
        Topic::scoped("campaign-events")
    }

    #[tokio::test]
    async fn delivers_published_messages_in_order() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe(&topic(), "projection").await.unwrap();

        broker.publish(&topic(), "a", b"one").await.unwrap();
        broker.publish(&topic(), "a", b"two").await.unwrap();

        let first = sub.receive(SHORT).await.unwrap().unwrap();
        let second = sub.receive(SHORT).await.unwrap().unwrap();
        assert_eq!(first.payload, b"one");
        assert_eq!(second.payload, b"two");
        assert_eq!(first.key, "a");
    }

    #[tokio::test]
    async fn receive_times_out_when_topic_is_empty() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe(&topic(), "projection").await.unwrap();
        assert!(sub.receive(SHORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn late_subscription_starts_at_earliest_message() {
        let broker = InMemoryBroker::new();
        broker.publish(&topic(), "k", b"before").await.unwrap();

        let mut sub = broker.subscribe(&topic(), "projection").await.unwrap();
        let delivery = sub.receive(SHORT).await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"before");
    }

    #[tokio::test]
    async fn shared_handles_split_the_stream() {
        let broker = InMemoryBroker::new();
        let mut a = broker.subscribe(&topic(), "projection").await.unwrap();
        let mut b = broker.subscribe(&topic(), "projection").await.unwrap();

        broker.publish(&topic(), "k1", b"one").await.unwrap();
        broker.publish(&topic(), "k2", b"two").await.unwrap();

        let from_a = a.receive(SHORT).await.unwrap().unwrap();
        let from_b = b.receive(SHORT).await.unwrap().unwrap();
        assert_ne!(from_a.message_id, from_b.message_id);
        assert!(a.receive(SHORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn distinct_subscriptions_each_receive_everything() {
        let broker = InMemoryBroker::new();
        let mut projection = broker.subscribe(&topic(), "projection").await.unwrap();
        let mut audit = broker.subscribe(&topic(), "audit").await.unwrap();

        broker.publish(&topic(), "k", b"event").await.unwrap();

        assert!(projection.receive(SHORT).await.unwrap().is_some());
        assert!(audit.receive(SHORT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn nacked_message_is_redelivered_with_count() {
        let broker = InMemoryBroker::with_redelivery_delay(Duration::from_millis(10));
        let mut sub = broker.subscribe(&topic(), "projection").await.unwrap();
        broker.publish(&topic(), "k", b"poison").await.unwrap();

        let first = sub.receive(SHORT).await.unwrap().unwrap();
        sub.nack(&first).await.unwrap();

        let again = sub.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(again.message_id, first.message_id);
        assert_eq!(again.redelivery_count, 1);
    }

    #[tokio::test]
    async fn acked_message_is_not_redelivered() {
        let broker = InMemoryBroker::with_redelivery_delay(Duration::from_millis(10));
        let mut sub = broker.subscribe(&topic(), "projection").await.unwrap();
        broker.publish(&topic(), "k", b"ok").await.unwrap();

        let delivery = sub.receive(SHORT).await.unwrap().unwrap();
        sub.ack(&delivery).await.unwrap();
        sub.nack(&delivery).await.unwrap();

        assert!(sub.receive(SHORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receive_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe(&topic(), "projection").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(&topic(), "k", b"late").await.unwrap();
        });

        let delivery = sub.receive(Duration::from_secs(2)).await.unwrap();
        assert_eq!(delivery.unwrap().payload, b"late");
    }

    #[tokio::test]
    async fn messages_acked_by_every_subscription_are_dropped() {
        let broker = InMemoryBroker::with_redelivery_delay(Duration::from_millis(10));
        let mut projection = broker.subscribe(&topic(), "projection").await.unwrap();
        let mut audit = broker.subscribe(&topic(), "audit").await.unwrap();
        broker.publish(&topic(), "k", b"one").await.unwrap();
        broker.publish(&topic(), "k", b"two").await.unwrap();

        let one = projection.receive(SHORT).await.unwrap().unwrap();
        projection.ack(&one).await.unwrap();
        assert_eq!(broker.published(&topic()).len(), 2);

        let audited = audit.receive(SHORT).await.unwrap().unwrap();
        audit.nack(&audited).await.unwrap();
        assert_eq!(broker.published(&topic()).len(), 2);

        let retried = audit.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(retried.payload, b"one");
        audit.ack(&retried).await.unwrap();
        assert_eq!(broker.published(&topic()).len(), 1);

        // Offsets stay stable after compaction.
        let two = projection.receive(SHORT).await.unwrap().unwrap();
        assert_eq!(two.message_id, "1");
        assert_eq!(two.payload, b"two");
        projection.ack(&two).await.unwrap();
        let two = audit.receive(SHORT).await.unwrap().unwrap();
        audit.ack(&two).await.unwrap();
        assert!(broker.published(&topic()).is_empty());

        let mut late = broker.subscribe(&topic(), "late").await.unwrap();
        broker.publish(&topic(), "k", b"three").await.unwrap();
        let three = late.receive(SHORT).await.unwrap().unwrap();
        assert_eq!(three.message_id, "2");
        assert_eq!(three.payload, b"three");
    }

    #[tokio::test]
    async fn unavailable_broker_rejects_publish() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);

        let result = broker.publish(&topic(), "k", b"x").await;
        assert!(matches!(result, Err(BrokerError::Unavailable(_))));
        assert!(broker.published(&topic()).is_empty());

        broker.set_available(true);
        broker.publish(&topic(), "k", b"x").await.unwrap();
        assert_eq!(broker.published(&topic()).len(), 1);
    }
}
