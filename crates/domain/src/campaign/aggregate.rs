//! Campaign aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};

use super::{
    BrandId, CampaignAction, CampaignError, CampaignEvent, CampaignStatus, CampaignType,
    CreateCampaign, Money, Objective, ValidationError,
    events::{CampaignCreatedData, CampaignMetricsUpdatedData},
};

/// Campaign aggregate root.
///
/// The authoritative write-side state of one marketing campaign, from DRAFT
/// through FINALIZED or CANCELLED.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    id: Option<AggregateId>,

    /// Restored from the aggregate record on load.
    #[serde(skip)]
    version: Version,

    brand_id: Option<BrandId>,
    name: String,
    description: Option<String>,
    campaign_type: CampaignType,
    objective: Objective,
    status: CampaignStatus,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    total_budget: Money,
    budget_spent: Money,
    sales_target: i64,
    sales_actual: i64,
    engagement_target: i64,
    engagement_actual: i64,
    target_audience: Option<String>,
    channels: Option<String>,
    terms: Option<String>,
    created_at: Option<DateTime<Utc>>,
    last_activity_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Campaign {
    type Event = CampaignEvent;
    type Error = CampaignError;

    fn aggregate_type() -> &'static str {
        "Campaign"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        let at = event.occurred_at();
        self.status = event.resulting_status();

        match event {
            CampaignEvent::CampaignCreated(data) => {
                self.id = Some(data.campaign_id);
                self.brand_id = Some(data.brand_id);
                self.name = data.name;
                self.description = data.description;
                self.campaign_type = data.campaign_type;
                self.objective = data.objective;
                self.total_budget = data.total_budget;
                self.sales_target = data.sales_target;
                self.engagement_target = data.engagement_target;
                self.target_audience = data.target_audience;
                self.channels = data.channels;
                self.terms = data.terms;
                self.created_at = Some(data.created_at);
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

        self.last_activity_at = Some(at);
        self.updated_at = Some(at);
    }
}

// Query methods
impl Campaign {
    pub fn brand_id(&self) -> Option<BrandId> {
        self.brand_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn campaign_type(&self) -> CampaignType {
        self.campaign_type
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    pub fn total_budget(&self) -> Money {
        self.total_budget
    }

    pub fn budget_spent(&self) -> Money {
        self.budget_spent
    }

    pub fn sales_target(&self) -> i64 {
        self.sales_target
    }

    pub fn sales_actual(&self) -> i64 {
        self.sales_actual
    }

    pub fn engagement_target(&self) -> i64 {
        self.engagement_target
    }

    pub fn engagement_actual(&self) -> i64 {
        self.engagement_actual
    }

    pub fn target_audience(&self) -> Option<&str> {
        self.target_audience.as_deref()
    }

    pub fn channels(&self) -> Option<&str> {
        self.channels.as_deref()
    }

    pub fn terms(&self) -> Option<&str> {
        self.terms.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns true if the campaign can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return the event to apply, or an error)
impl Campaign {
    /// Creates a new campaign.
    pub fn create(&self, cmd: &CreateCampaign) -> Result<CampaignEvent, CampaignError> {
        if self.id.is_some() {
            return Err(CampaignError::AlreadyCreated);
        }
        cmd.validate()?;

        Ok(CampaignEvent::CampaignCreated(CampaignCreatedData {
            campaign_id: cmd.campaign_id,
            brand_id: cmd.brand_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            campaign_type: cmd.campaign_type,
            objective: cmd.objective,
            total_budget: cmd.total_budget,
            sales_target: cmd.sales_target,
            engagement_target: cmd.engagement_target,
            target_audience: cmd.target_audience.clone(),
            channels: cmd.channels.clone(),
            terms: cmd.terms.clone(),
            created_at: Utc::now(),
        }))
    }

    /// Sets the campaign dates.
    pub fn schedule(
        &self,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<CampaignEvent, CampaignError> {
        let (id, brand_id) = self.ensure_allowed(CampaignAction::Schedule)?;
        if end_date <= start_date {
            return Err(super::ValidationError::InvalidDateRange {
                start: start_date,
                end: end_date,
            }
            .into());
        }
        Ok(CampaignEvent::scheduled(
            id,
            brand_id,
            self.name.clone(),
            start_date,
            end_date,
        ))
    }

    /// Activates a scheduled campaign or resumes a paused one.
    pub fn activate(&self) -> Result<CampaignEvent, CampaignError> {
        let (id, brand_id) = self.ensure_allowed(CampaignAction::Activate)?;
        let resumed = self.status == CampaignStatus::Paused;
        Ok(CampaignEvent::activated(
            id,
            brand_id,
            self.name.clone(),
            resumed,
        ))
    }

    pub fn pause(&self, reason: Option<String>) -> Result<CampaignEvent, CampaignError> {
        let (id, brand_id) = self.ensure_allowed(CampaignAction::Pause)?;
        Ok(CampaignEvent::paused(id, brand_id, self.name.clone(), reason))
    }

    pub fn finalize(&self, reason: Option<String>) -> Result<CampaignEvent, CampaignError> {
        let (id, brand_id) = self.ensure_allowed(CampaignAction::Finalize)?;
        Ok(CampaignEvent::finalized(
            id,
            brand_id,
            self.name.clone(),
            reason,
        ))
    }

    pub fn cancel(&self, reason: Option<String>) -> Result<CampaignEvent, CampaignError> {
        let (id, brand_id) = self.ensure_allowed(CampaignAction::Cancel)?;
        Ok(CampaignEvent::cancelled(
            id,
            brand_id,
            self.name.clone(),
            reason,
            self.status,
        ))
    }

    /// Adds the deltas to the campaign counters.
    pub fn update_metrics(
        &self,
        sales_delta: i64,
        engagement_delta: i64,
        budget_spent_delta: Money,
    ) -> Result<CampaignEvent, CampaignError> {
        let (id, brand_id) = self.ensure_allowed(CampaignAction::UpdateMetrics)?;
        let sales_actual = accumulate("sales_actual", self.sales_actual, sales_delta)?;
        let engagement_actual =
            accumulate("engagement_actual", self.engagement_actual, engagement_delta)?;
        let budget_spent = self
            .budget_spent
            .checked_add(budget_spent_delta)
            .ok_or(ValidationError::CounterOverflow {
                field: "budget_spent",
                current: self.budget_spent.cents(),
                delta: budget_spent_delta.cents(),
            })?;

        Ok(CampaignEvent::CampaignMetricsUpdated(
            CampaignMetricsUpdatedData {
                campaign_id: id,
                brand_id,
                name: self.name.clone(),
                sales_delta,
                engagement_delta,
                budget_spent_delta,
                sales_actual,
                engagement_actual,
                budget_spent,
                updated_at: Utc::now(),
            },
        ))
    }

    fn ensure_allowed(
        &self,
        action: CampaignAction,
    ) -> Result<(AggregateId, BrandId), CampaignError> {
        let (Some(id), Some(brand_id)) = (self.id, self.brand_id) else {
            return Err(CampaignError::NotCreated);
        };
        if !self.status.allows(action) {
            return Err(CampaignError::invalid_transition(self.status, action));
        }
        Ok((id, brand_id))
    }
}

fn accumulate(field: &'static str, current: i64, delta: i64) -> Result<i64, ValidationError> {
    current
        .checked_add(delta)
        .ok_or(ValidationError::CounterOverflow {
            field,
            current,
            delta,
        })
}
