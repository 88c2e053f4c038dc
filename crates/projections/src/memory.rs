//! In-memory read model store for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, EventEnvelope};
use domain::CampaignEvent;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projected, project};
use crate::store::ReadModelStore;
use crate::view::{CampaignFilter, CampaignView};

/// Read model rows held behind a single lock.
#[derive(Clone, Default)]
pub struct InMemoryReadModel {
    rows: Arc<RwLock<HashMap<AggregateId, CampaignView>>>,
}

impl InMemoryReadModel {
    /// Creates a new empty read model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl ReadModelStore for InMemoryReadModel {
    async fn apply(&self, envelope: &EventEnvelope, event: &CampaignEvent) -> Result<Projected> {
        // The write lock spans the version check and the write.
        let mut rows = self.rows.write().await;
        let projected = project(rows.get(&envelope.aggregate_id), envelope, event);
        if let Projected::Upsert(view) = &projected {
            rows.insert(view.id, view.clone());
        }
        Ok(projected)
    }

    async fn get(&self, id: AggregateId) -> Result<Option<CampaignView>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &CampaignFilter) -> Result<Vec<CampaignView>> {
        let mut views: Vec<CampaignView> = self
            .rows
            .read()
            .await
            .values()
            .filter(|view| filter.matches(view))
            .cloned()
            .collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::Version;
    use domain::{BrandId, CampaignStatus, DomainEvent};

    fn envelope(id: AggregateId, version: i64, event: &CampaignEvent) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type(event.event_type())
            .aggregate_id(id)
            .version(Version::new(version))
            .data_raw(event.to_data().unwrap())
            .try_build()
            .unwrap()
    }

    fn created(id: AggregateId, brand_id: BrandId) -> CampaignEvent {
        CampaignEvent::CampaignCreated(domain::CampaignCreatedData {
            campaign_id: id,
            brand_id,
            name: "Launch".to_string(),
            description: None,
            campaign_type: domain::CampaignType::Influencer,
            objective: domain::Objective::BrandAwareness,
            total_budget: domain::Money::zero(),
            sales_target: 0,
            engagement_target: 0,
            target_audience: None,
            channels: None,
            terms: None,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn apply_persists_upserts_only() {
        let store = InMemoryReadModel::new();
        let id = AggregateId::new();
        let brand = BrandId::new();
        let event = created(id, brand);

        store.apply(&envelope(id, 1, &event), &event).await.unwrap();
        let second = store.apply(&envelope(id, 1, &event), &event).await.unwrap();

        assert_eq!(second, Projected::Stale);
        assert_eq!(store.len().await, 1);
        let row = store.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn missing_row_is_not_created() {
        let store = InMemoryReadModel::new();
        let id = AggregateId::new();
        let event = CampaignEvent::paused(id, BrandId::new(), "x".to_string(), None);

        let outcome = store.apply(&envelope(id, 4, &event), &event).await.unwrap();

        assert_eq!(outcome, Projected::MissingRow);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn list_filters_rows() {
        let store = InMemoryReadModel::new();
        let brand = BrandId::new();
        for brand_id in [brand, brand, BrandId::new()] {
            let id = AggregateId::new();
            let event = created(id, brand_id);
            store.apply(&envelope(id, 1, &event), &event).await.unwrap();
        }

        let views = store.list(&CampaignFilter::brand(brand)).await.unwrap();
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.brand_id == brand));
    }
}
