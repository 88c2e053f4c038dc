//! Campaign read model and the event projector that maintains it.
//!
//! This crate provides the query side of the system:
//! - [`project`] decides, purely, what one event does to a read row
//! - [`ReadModelStore`] holds the rows ([`InMemoryReadModel`], [`PostgresReadModel`])
//! - [`EventProjector`] applies broker messages idempotently, and
//!   [`ProjectorWorker`] drives it from a subscription
//! - [`CampaignQueries`] answers read requests without touching the write model
//! - [`ProjectionRebuilder`] replays the outbox log and checks consistency

pub mod error;
pub mod memory;
pub mod postgres;
pub mod projection;
pub mod projector;
pub mod queries;
pub mod rebuild;
pub mod store;
pub mod view;
pub mod worker;

pub use error::{ProjectionError, Result};
pub use memory::InMemoryReadModel;
pub use postgres::PostgresReadModel;
pub use projection::{Projected, project};
pub use projector::{ApplyOutcome, EventProjector};
pub use queries::{CampaignQueries, CampaignQuery, QueryResult};
pub use rebuild::{ConsistencyReport, Mismatch, ProjectionRebuilder, RebuildReport};
pub use store::ReadModelStore;
pub use view::{CampaignFilter, CampaignView};
pub use worker::{DEFAULT_RECEIVE_TIMEOUT, DEFAULT_SUBSCRIPTION, ProjectorConfig, ProjectorWorker};
