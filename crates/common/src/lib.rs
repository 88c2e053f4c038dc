//! Types shared by every stage of the campaign pipeline.
//!
//! - [`AggregateId`] and [`Version`] identify an aggregate and its event sequence.
//! - [`CorrelationId`] threads a saga through commands and events.
//! - [`EventEnvelope`] is the wire format written to the outbox and published
//!   to the broker.

pub mod envelope;
pub mod types;

pub use envelope::{CORRELATION_ID_KEY, EventEnvelope, EventEnvelopeBuilder};
pub use types::{AggregateId, CorrelationId, Version};
