//! The campaign read model row and its filter.

use chrono::{DateTime, Utc};
use common::{AggregateId, Version};
use domain::{
    BrandId, CampaignCreatedData, CampaignEvent, CampaignStatus, CampaignType, Money, Objective,
};
use serde::{Deserialize, Serialize};

/// Denormalized, query-shaped view of one campaign.
///
/// Only the event projector writes these rows. `last_applied_version` is the
/// highest event version applied to the row and never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignView {
    pub id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub objective: Objective,
    pub status: CampaignStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub total_budget: Money,
    pub budget_spent: Money,
    pub sales_target: i64,
    pub sales_actual: i64,
    pub engagement_target: i64,
    pub engagement_actual: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_applied_version: Version,
}

impl CampaignView {
    /// Builds the initial row from a CampaignCreated event.
    pub fn created(
        id: AggregateId,
        data: &CampaignCreatedData,
        version: Version,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            brand_id: data.brand_id,
            name: data.name.clone(),
            description: data.description.clone(),
            campaign_type: data.campaign_type,
            objective: data.objective,
            status: CampaignStatus::Draft,
            start_date: None,
            end_date: None,
            total_budget: data.total_budget,
            budget_spent: Money::zero(),
            sales_target: data.sales_target,
            sales_actual: 0,
            engagement_target: data.engagement_target,
            engagement_actual: 0,
            created_at: data.created_at,
            last_activity_at: at,
            last_applied_version: version,
        }
    }

    /// Applies the fields an event carries to this row.
    ///
    /// Does not touch the version or last-activity stamp.
    pub(crate) fn apply_fields(&mut self, event: &CampaignEvent) {
        match event {
            // A create replayed onto an existing row only refreshes the
            // descriptive fields it carries.
            CampaignEvent::CampaignCreated(data) => {
                self.brand_id = data.brand_id;
                self.name = data.name.clone();
                self.description = data.description.clone();
                self.campaign_type = data.campaign_type;
                self.objective = data.objective;
                self.total_budget = data.total_budget;
                self.sales_target = data.sales_target;
                self.engagement_target = data.engagement_target;
                self.created_at = data.created_at;
                return;
            }
            CampaignEvent::CampaignScheduled(data) => {
                self.start_date = Some(data.start_date);
                self.end_date = Some(data.end_date);
            }
            CampaignEvent::CampaignMetricsUpdated(data) => {
                self.sales_actual = data.sales_actual;
                self.engagement_actual = data.engagement_actual;
                self.budget_spent = data.budget_spent;
            }
            CampaignEvent::CampaignActivated(_)
            | CampaignEvent::CampaignPaused(_)
            | CampaignEvent::CampaignFinalized(_)
            | CampaignEvent::CampaignCancelled(_) => {}
        }
        self.status = event.resulting_status();
    }
}

/// Combinable criteria for listing campaigns. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignFilter {
    pub brand_id: Option<BrandId>,
    pub campaign_type: Option<CampaignType>,
    pub status: Option<CampaignStatus>,
    pub objective: Option<Objective>,
    /// Start date on or after this instant.
    pub starts_from: Option<DateTime<Utc>>,
    /// End date on or before this instant.
    pub ends_until: Option<DateTime<Utc>>,
    pub min_budget: Option<Money>,
    pub max_budget: Option<Money>,
}

impl CampaignFilter {
    pub fn brand(brand_id: BrandId) -> Self {
        Self {
            brand_id: Some(brand_id),
            ..Self::default()
        }
    }

    pub fn campaign_type(campaign_type: CampaignType) -> Self {
        Self {
            campaign_type: Some(campaign_type),
            ..Self::default()
        }
    }

    pub fn status(status: CampaignStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn objective(objective: Objective) -> Self {
        Self {
            objective: Some(objective),
            ..Self::default()
        }
    }

    pub fn date_range(
        starts_from: Option<DateTime<Utc>>,
        ends_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            starts_from,
            ends_until,
            ..Self::default()
        }
    }

    pub fn budget_range(min_budget: Option<Money>, max_budget: Option<Money>) -> Self {
        Self {
            min_budget,
            max_budget,
            ..Self::default()
        }
    }

    /// Returns true if `view` satisfies every set criterion.
    ///
    /// Date bounds only match campaigns that have the corresponding date.
    pub fn matches(&self, view: &CampaignView) -> bool {
        self.brand_id.is_none_or(|b| view.brand_id == b)
            && self.campaign_type.is_none_or(|t| view.campaign_type == t)
            && self.status.is_none_or(|s| view.status == s)
            && self.objective.is_none_or(|o| view.objective == o)
            && self
                .starts_from
                .is_none_or(|from| view.start_date.is_some_and(|start| start >= from))
            && self
                .ends_until
                .is_none_or(|until| view.end_date.is_some_and(|end| end <= until))
            && self.min_budget.is_none_or(|min| view.total_budget >= min)
            && self.max_budget.is_none_or(|max| view.total_budget <= max)
    }
}
