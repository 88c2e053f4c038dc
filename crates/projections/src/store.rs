//! Read model store abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, EventEnvelope};
use domain::CampaignEvent;

use crate::Result;
use crate::projection::Projected;
use crate::view::{CampaignFilter, CampaignView};

/// Durable home of the campaign read model.
///
/// Only the event projector calls [`ReadModelStore::apply`]; everything
/// else reads.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Applies one event to the campaign's row.
    ///
    /// Reading the current row, comparing versions and writing the new row
    /// happen atomically, so two projector instances never interleave on
    /// the same campaign.
    async fn apply(&self, envelope: &EventEnvelope, event: &CampaignEvent) -> Result<Projected>;

    /// Gets one campaign by ID.
    async fn get(&self, id: AggregateId) -> Result<Option<CampaignView>>;

    /// Lists campaigns matching `filter`, most recently created first.
    async fn list(&self, filter: &CampaignFilter) -> Result<Vec<CampaignView>>;
}

#[async_trait]
impl<R: ReadModelStore + ?Sized> ReadModelStore for Arc<R> {
    async fn apply(&self, envelope: &EventEnvelope, event: &CampaignEvent) -> Result<Projected> {
        (**self).apply(envelope, event).await
    }

    async fn get(&self, id: AggregateId) -> Result<Option<CampaignView>> {
        (**self).get(id).await
    }

    async fn list(&self, filter: &CampaignFilter) -> Result<Vec<CampaignView>> {
        (**self).list(filter).await
    }
}

#[async_trait]
impl<R: ReadModelStore + ?Sized> ReadModelStore for &R {
    async fn apply(&self, envelope: &EventEnvelope, event: &CampaignEvent) -> Result<Projected> {
        (**self).apply(envelope, event).await
    }

    async fn get(&self, id: AggregateId) -> Result<Option<CampaignView>> {
        (**self).get(id).await
    }

    async fn list(&self, filter: &CampaignFilter) -> Result<Vec<CampaignView>> {
        (**self).list(filter).await
    }
}
