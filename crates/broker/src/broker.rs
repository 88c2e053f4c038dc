use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Result, Topic};

/// A message handed to a subscriber.
///
/// The delivery must be acknowledged with [`Subscription::ack`] once processed,
/// or negatively acknowledged with [`Subscription::nack`] to request redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned identifier, used to ack or nack.
    pub message_id: String,

    /// Partition key the message was published with.
    pub key: String,

    /// Raw message body.
    pub payload: Vec<u8>,

    /// Number of times this message was handed out before.
    pub redelivery_count: u32,
}

/// Publishing side of a message broker.
///
/// Delivery is at-least-once. Messages that share a key are stored in publish
/// order; consumers must still tolerate duplicates and reordering.
///
/// Clients are constructed explicitly and passed to the components that need
/// them, usually as `Arc<dyn MessageBroker>`.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes a message keyed by `key`.
    async fn publish(&self, topic: &Topic, key: &str, payload: &[u8]) -> Result<()>;

    /// Opens a durable shared subscription.
    ///
    /// Handles opened with the same subscription name split the stream between
    /// them; each distinct name receives every message.
    async fn subscribe(&self, topic: &Topic, subscription: &str) -> Result<Box<dyn Subscription>>;
}

/// Consuming side of a shared subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when the timeout elapses without a message, so the
    /// caller can check for shutdown between receives.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>>;

    /// Marks a delivery as consumed.
    async fn ack(&mut self, delivery: &Delivery) -> Result<()>;

    /// Requests redelivery of a message that could not be processed.
    async fn nack(&mut self, delivery: &Delivery) -> Result<()>;
}

#[async_trait]
impl<B> MessageBroker for Arc<B>
where
    B: MessageBroker + ?Sized,
{
    async fn publish(&self, topic: &Topic, key: &str, payload: &[u8]) -> Result<()> {
        (**self).publish(topic, key, payload).await
    }

    async fn subscribe(&self, topic: &Topic, subscription: &str) -> Result<Box<dyn Subscription>> {
        (**self).subscribe(topic, subscription).await
    }
}
