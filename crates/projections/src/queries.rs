//! Read-side queries over the campaign read model.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{BrandId, CampaignStatus, CampaignType, Money, Objective};

use crate::Result;
use crate::store::ReadModelStore;
use crate::view::{CampaignFilter, CampaignView};

/// Every query the read side answers.
#[derive(Debug, Clone, PartialEq)]
pub enum CampaignQuery {
    GetById(AggregateId),
    ByBrand(BrandId),
    ByType(CampaignType),
    ByStatus(CampaignStatus),
    Active,
    ByObjective(Objective),
    ByDateRange {
        starts_from: Option<DateTime<Utc>>,
        ends_until: Option<DateTime<Utc>>,
    },
    ByBudgetRange {
        min: Option<Money>,
        max: Option<Money>,
    },
    Filter(CampaignFilter),
}

/// Answer to a [`CampaignQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    One(Option<CampaignView>),
    Many(Vec<CampaignView>),
}

impl QueryResult {
    /// Flattens the answer into a list.
    pub fn into_vec(self) -> Vec<CampaignView> {
        match self {
            QueryResult::One(view) => view.into_iter().collect(),
            QueryResult::Many(views) => views,
        }
    }
}

/// Query facade over a read model store. Never touches the write model.
#[derive(Clone)]
pub struct CampaignQueries<R: ReadModelStore> {
    store: R,
}

impl<R: ReadModelStore> CampaignQueries<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }

    /// Executes any query.
    #[tracing::instrument(skip(self))]
    pub async fn execute(&self, query: CampaignQuery) -> Result<QueryResult> {
        let filter = match query {
            CampaignQuery::GetById(id) => return Ok(QueryResult::One(self.store.get(id).await?)),
            CampaignQuery::ByBrand(brand_id) => CampaignFilter::brand(brand_id),
            CampaignQuery::ByType(campaign_type) => CampaignFilter::campaign_type(campaign_type),
            CampaignQuery::ByStatus(status) => CampaignFilter::status(status),
            CampaignQuery::Active => CampaignFilter::status(CampaignStatus::Active),
            CampaignQuery::ByObjective(objective) => CampaignFilter::objective(objective),
            CampaignQuery::ByDateRange {
                starts_from,
                ends_until,
            } => CampaignFilter::date_range(starts_from, ends_until),
            CampaignQuery::ByBudgetRange { min, max } => CampaignFilter::budget_range(min, max),
            CampaignQuery::Filter(filter) => filter,
        };
        Ok(QueryResult::Many(self.store.list(&filter).await?))
    }

    pub async fn get_by_id(&self, id: AggregateId) -> Result<Option<CampaignView>> {
        self.store.get(id).await
    }

    pub async fn list_by_brand(&self, brand_id: BrandId) -> Result<Vec<CampaignView>> {
        self.many(CampaignQuery::ByBrand(brand_id)).await
    }

    pub async fn list_by_type(&self, campaign_type: CampaignType) -> Result<Vec<CampaignView>> {
        self.many(CampaignQuery::ByType(campaign_type)).await
    }

    pub async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<CampaignView>> {
        self.many(CampaignQuery::ByStatus(status)).await
    }

    pub async fn list_active(&self) -> Result<Vec<CampaignView>> {
        self.many(CampaignQuery::Active).await
    }

    pub async fn list_by_objective(&self, objective: Objective) -> Result<Vec<CampaignView>> {
        self.many(CampaignQuery::ByObjective(objective)).await
    }

    pub async fn list_by_date_range(
        &self,
        starts_from: Option<DateTime<Utc>>,
        ends_until: Option<DateTime<Utc>>,
    ) -> Result<Vec<CampaignView>> {
        self.many(CampaignQuery::ByDateRange {
            starts_from,
            ends_until,
        })
        .await
    }

    pub async fn list_by_budget_range(
        &self,
        min: Option<Money>,
        max: Option<Money>,
    ) -> Result<Vec<CampaignView>> {
        self.many(CampaignQuery::ByBudgetRange { min, max }).await
    }

    async fn many(&self, query: CampaignQuery) -> Result<Vec<CampaignView>> {
        Ok(self.execute(query).await?.into_vec())
    }
}
