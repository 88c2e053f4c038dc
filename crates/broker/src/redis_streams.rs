//! Redis Streams-backed broker.
//!
//! - **Stream key**: `{tenant}:{namespace}:{topic}` per topic
//! - **Subscriptions**: one consumer group per subscription name, created with
//!   `XGROUP CREATE ... MKSTREAM` starting at the beginning of the stream
//! - **Receive**: `XREADGROUP ... BLOCK`, one entry at a time
//! - **Ack**: `XACK`
//! - **Nack**: the entry stays in the consumer's pending list and is claimed
//!   back with `XCLAIM` once its own redelivery delay has passed; new entries
//!   keep flowing in the meantime
//! - **Recovery**: on subscribe the consumer re-reads its own pending list, and
//!   it periodically claims entries other consumers left pending for longer
//!   than the claim idle time (`XPENDING` + `XCLAIM`)

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamReadReply};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::{BrokerError, Delivery, MessageBroker, Result, Subscription, Topic};

const KEY_FIELD: &str = "key";
const PAYLOAD_FIELD: &str = "payload";

/// Default delay before a nacked entry is read again.
const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(1);

/// Default idle time after which another consumer's pending entry is claimed.
const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(30);

/// Pending entries fetched per `XREADGROUP 0` / `XPENDING` round trip.
const PENDING_BATCH: usize = 100;

fn stream_key(topic: &Topic) -> String {
    format!("{}:{}:{}", topic.tenant(), topic.namespace(), topic.name())
}

/// Broker client over Redis Streams.
///
/// Publishing shares one multiplexed connection. Every subscription opens its
/// own connection since a blocking `XREADGROUP` would stall other commands
/// pipelined on a shared one.
#[derive(Clone)]
pub struct RedisStreamsBroker {
    client: redis::Client,
    connection: MultiplexedConnection,
    consumer_name: String,
    redelivery_delay: Duration,
    claim_idle: Duration,
}

impl RedisStreamsBroker {
    /// Connects to Redis.
    ///
    /// `consumer_name` identifies this process inside consumer groups. It must
    /// be unique per running instance and stay the same across restarts, so a
    /// restarted instance finds the entries it left unacknowledged.
    pub async fn connect(redis_url: &str, consumer_name: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client,
            connection,
            consumer_name: consumer_name.into(),
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
            claim_idle: DEFAULT_CLAIM_IDLE,
        })
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Sets how long an entry must sit unacknowledged in another consumer's
    /// pending list before this consumer takes it over.
    pub fn with_claim_idle(mut self, idle: Duration) -> Self {
        self.claim_idle = idle;
        self
    }

    async fn ensure_group(
        &self,
        connection: &mut MultiplexedConnection,
        stream: &str,
        group: &str,
    ) -> Result<()> {
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(connection)
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MessageBroker for RedisStreamsBroker {
    #[instrument(skip(self, payload), fields(topic = %topic), err)]
    async fn publish(&self, topic: &Topic, key: &str, payload: &[u8]) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("XADD")
            .arg(stream_key(topic))
            .arg("*")
            .arg(KEY_FIELD)
            .arg(key)
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut connection)
            .await
            .map_err(|e| BrokerError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic, subscription: &str) -> Result<Box<dyn Subscription>> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let stream = stream_key(topic);
        self.ensure_group(&mut connection, &stream, subscription)
            .await?;

        let mut subscription = RedisStreamsSubscription {
            connection,
            stream,
            group: subscription.to_string(),
            consumer: self.consumer_name.clone(),
            redelivery_delay: self.redelivery_delay,
            claim_idle: self.claim_idle,
            next_claim_at: Instant::now(),
            backlog: VecDeque::new(),
            retry_at: HashMap::new(),
            redeliveries: HashMap::new(),
        };
        subscription.load_own_pending().await?;

        Ok(Box::new(subscription))
    }
}

/// A consumer inside a Redis consumer group.
pub struct RedisStreamsSubscription {
    connection: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
    redelivery_delay: Duration,
    claim_idle: Duration,
    next_claim_at: Instant,
    /// Pending entries recovered on subscribe or claimed from other
    /// consumers, handed out before anything else.
    backlog: VecDeque<Delivery>,
    /// Nacked entries and the instant each becomes due again.
    retry_at: HashMap<String, Instant>,
    redeliveries: HashMap<String, u32>,
}

impl RedisStreamsSubscription {
    fn receive_error(&self, e: impl ToString) -> BrokerError {
        BrokerError::Receive {
            subscription: self.group.clone(),
            reason: e.to_string(),
        }
    }

    fn to_delivery(&mut self, entry: StreamId, redelivery_count: u32) -> Result<Delivery> {
        let key: String = entry.get(KEY_FIELD).unwrap_or_default();
        let payload: Vec<u8> = entry
            .get(PAYLOAD_FIELD)
            .ok_or_else(|| self.receive_error(format!("entry {} has no payload field", entry.id)))?;

        if redelivery_count > 0 {
            self.redeliveries.insert(entry.id.clone(), redelivery_count);
        }
        Ok(Delivery {
            message_id: entry.id,
            key,
            payload,
            redelivery_count,
        })
    }

    async fn read_group(
        &mut self,
        id: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamId>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count);
        if let Some(block) = block {
            // BLOCK 0 means forever in Redis.
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream).arg(id);

        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut self.connection)
            .await
            .map_err(|e| self.receive_error(e))?;

        Ok(reply
            .and_then(|reply| reply.keys.into_iter().next())
            .map(|key| key.ids)
            .unwrap_or_default())
    }

    async fn claim(&mut self, min_idle: Duration, ids: &[String]) -> Result<Vec<StreamId>> {
        let reply: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle.as_millis() as u64)
            .arg(ids)
            .query_async(&mut self.connection)
            .await
            .map_err(|e| self.receive_error(e))?;
        Ok(reply.ids)
    }

    /// Queues the entries this consumer left pending in a previous run.
    async fn load_own_pending(&mut self) -> Result<()> {
        let mut after = "0".to_string();
        loop {
            let entries = self.read_group(&after, PENDING_BATCH, None).await?;
            let fetched = entries.len();
            for entry in entries {
                after = entry.id.clone();
                let delivery = self.to_delivery(entry, 1)?;
                self.backlog.push_back(delivery);
            }
            if fetched < PENDING_BATCH {
                break;
            }
        }

        if !self.backlog.is_empty() {
            info!(
                subscription = %self.group,
                consumer = %self.consumer,
                entries = self.backlog.len(),
                "resuming entries left pending by a previous run"
            );
        }
        Ok(())
    }

    /// Takes over entries that other consumers have held unacknowledged for
    /// longer than the claim idle time.
    async fn claim_abandoned(&mut self) -> Result<()> {
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(PENDING_BATCH)
            .query_async(&mut self.connection)
            .await
            .map_err(|e| self.receive_error(e))?;

        let idle_ms = self.claim_idle.as_millis() as u64;
        let abandoned: HashMap<String, u64> = pending
            .into_iter()
            .filter(|(_, consumer, idle, _)| *consumer != self.consumer && *idle >= idle_ms)
            .map(|(id, _, _, delivered)| (id, delivered))
            .collect();
        if abandoned.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = abandoned.keys().cloned().collect();
        let mut claimed = self.claim(self.claim_idle, &ids).await?;
        claimed.sort_by(|a, b| a.id.cmp(&b.id));

        info!(
            subscription = %self.group,
            consumer = %self.consumer,
            entries = claimed.len(),
            "claimed entries abandoned by other consumers"
        );
        for entry in claimed {
            let delivered = abandoned.get(&entry.id).copied().unwrap_or(1);
            let delivery = self.to_delivery(entry, delivered.max(1) as u32)?;
            self.backlog.push_back(delivery);
        }
        Ok(())
    }

    fn due_retry(&self, now: Instant) -> Option<String> {
        self.retry_at
            .iter()
            .filter(|(_, at)| **at <= now)
            .min_by_key(|(_, at)| **at)
            .map(|(id, _)| id.clone())
    }

    fn next_wake(&self, deadline: Instant) -> Instant {
        self.retry_at
            .values()
            .copied()
            .chain([self.next_claim_at, deadline])
            .min()
            .unwrap_or(deadline)
    }
}

#[async_trait]
impl Subscription for RedisStreamsSubscription {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(delivery) = self.backlog.pop_front() {
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if let Some(id) = self.due_retry(now) {
                self.retry_at.remove(&id);
                // An entry acked elsewhere in the meantime is no longer pending.
                let claimed = self
                    .claim(Duration::ZERO, std::slice::from_ref(&id))
                    .await?;
                if let Some(entry) = claimed.into_iter().next() {
                    let count = self.redeliveries.get(&id).copied().unwrap_or(1);
                    return self.to_delivery(entry, count).map(Some);
                }
                self.redeliveries.remove(&id);
                continue;
            }

            if self.next_claim_at <= now {
                self.next_claim_at = now + self.claim_idle;
                self.claim_abandoned().await?;
                if let Some(delivery) = self.backlog.pop_front() {
                    return Ok(Some(delivery));
                }
            }

            let wait = self.next_wake(deadline).saturating_duration_since(now);
            if let Some(entry) = self.read_group(">", 1, Some(wait)).await?.pop() {
                return self.to_delivery(entry, 0).map(Some);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&delivery.message_id)
            .query_async(&mut self.connection)
            .await
            .map_err(|e| BrokerError::Acknowledge {
                message_id: delivery.message_id.clone(),
                reason: e.to_string(),
            })?;
        self.redeliveries.remove(&delivery.message_id);
        self.retry_at.remove(&delivery.message_id);
        Ok(())
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<()> {
        *self
            .redeliveries
            .entry(delivery.message_id.clone())
            .or_insert(0) += 1;
        self.retry_at.insert(
            delivery.message_id.clone(),
            Instant::now() + self.redelivery_delay,
        );
        debug!(message_id = %delivery.message_id, "entry left pending for redelivery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_joins_topic_scope() {
        let topic = Topic::new("campaign-management", "events", "campaign-events");
        assert_eq!(stream_key(&topic), "campaign-management:events:campaign-events");
    }
}
