//! Message broker abstraction.
//!
//! The outbox dispatcher publishes through [`MessageBroker`], and the event
//! projector consumes through a shared [`Subscription`]. Two backends are provided:
//!
//! - [`InMemoryBroker`]: in-process topics, used by tests and single-node runs
//! - `RedisStreamsBroker` (feature `redis`): Redis Streams consumer groups

pub mod broker;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_streams;
pub mod topic;

pub use broker::{Delivery, MessageBroker, Subscription};
pub use error::{BrokerError, Result};
pub use memory::{InMemoryBroker, InMemorySubscription, PublishedMessage};
#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsBroker, RedisStreamsSubscription};
pub use topic::{CAMPAIGN_EVENTS, CONTENT_EVENTS, DEFAULT_NAMESPACE, DEFAULT_TENANT, Topic};
