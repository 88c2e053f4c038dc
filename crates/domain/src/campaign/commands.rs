//! Campaign commands.

use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationId};

use crate::command::Command;

use super::{BrandId, Campaign, CampaignType, Money, Objective, ValidationError};

/// Command to create a new campaign in DRAFT.
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    /// The campaign ID to create, client-supplied or generated.
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub objective: Objective,
    pub total_budget: Money,
    pub sales_target: i64,
    pub engagement_target: i64,
    pub target_audience: Option<String>,
    pub channels: Option<String>,
    pub terms: Option<String>,
    pub correlation_id: Option<CorrelationId>,
}

impl CreateCampaign {
    /// Creates a new CreateCampaign command with a generated campaign ID.
    pub fn new(
        brand_id: BrandId,
        name: impl Into<String>,
        campaign_type: CampaignType,
        objective: Objective,
    ) -> Self {
        Self {
            campaign_id: AggregateId::new(),
            brand_id,
            name: name.into(),
            description: None,
            campaign_type,
            objective,
            total_budget: Money::zero(),
            sales_target: 0,
            engagement_target: 0,
            target_audience: None,
            channels: None,
            terms: None,
            correlation_id: None,
        }
    }

    /// Uses a client-supplied campaign ID.
    pub fn with_id(mut self, campaign_id: AggregateId) -> Self {
        self.campaign_id = campaign_id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_budget(mut self, total_budget: Money) -> Self {
        self.total_budget = total_budget;
        self
    }

    pub fn with_targets(mut self, sales_target: i64, engagement_target: i64) -> Self {
        self.sales_target = sales_target;
        self.engagement_target = engagement_target;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Checks the command fields before any store is touched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::NameRequired);
        }
        if self.brand_id.is_nil() {
            return Err(ValidationError::BrandIdRequired);
        }
        non_negative("total_budget", self.total_budget.cents())?;
        non_negative("sales_target", self.sales_target)?;
        non_negative("engagement_target", self.engagement_target)?;
        Ok(())
    }
}

impl Command for CreateCampaign {
    type Aggregate = Campaign;

    fn aggregate_id(&self) -> AggregateId {
        self.campaign_id
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

/// Command to set the start and end dates of a DRAFT campaign.
#[derive(Debug, Clone)]
pub struct ScheduleCampaign {
    pub campaign_id: AggregateId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub correlation_id: Option<CorrelationId>,
}

impl ScheduleCampaign {
    /// Creates a new ScheduleCampaign command.
    pub fn new(campaign_id: AggregateId, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            campaign_id,
            start_date,
            end_date,
            correlation_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_date <= self.start_date {
            return Err(ValidationError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }
}

impl Command for ScheduleCampaign {
    type Aggregate = Campaign;

    fn aggregate_id(&self) -> AggregateId {
        self.campaign_id
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

/// Command to activate a scheduled campaign or resume a paused one.
#[derive(Debug, Clone)]
pub struct ActivateCampaign {
    pub campaign_id: AggregateId,
    pub correlation_id: Option<CorrelationId>,
}

impl ActivateCampaign {
    /// Creates a new ActivateCampaign command.
    pub fn new(campaign_id: AggregateId) -> Self {
        Self {
            campaign_id,
            correlation_id: None,
        }
    }
}

impl Command for ActivateCampaign {
    type Aggregate = Campaign;

    fn aggregate_id(&self) -> AggregateId {
        self.campaign_id
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

/// Command to pause an active campaign.
#[derive(Debug, Clone)]
pub struct PauseCampaign {
    pub campaign_id: AggregateId,
    pub reason: Option<String>,
    pub correlation_id: Option<CorrelationId>,
}

impl PauseCampaign {
    /// Creates a new PauseCampaign command.
    pub fn new(campaign_id: AggregateId, reason: Option<String>) -> Self {
        Self {
            campaign_id,
            reason,
            correlation_id: None,
        }
    }
}

impl Command for PauseCampaign {
    type Aggregate = Campaign;

    fn aggregate_id(&self) -> AggregateId {
        self.campaign_id
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

/// Command to finalize an active or paused campaign.
#[derive(Debug, Clone)]
pub struct FinalizeCampaign {
    pub campaign_id: AggregateId,
    pub reason: Option<String>,
    pub correlation_id: Option<CorrelationId>,
}

impl FinalizeCampaign {
    /// Creates a new FinalizeCampaign command.
    pub fn new(campaign_id: AggregateId, reason: Option<String>) -> Self {
        Self {
            campaign_id,
            reason,
            correlation_id: None,
        }
    }
}

impl Command for FinalizeCampaign {
    type Aggregate = Campaign;

    fn aggregate_id(&self) -> AggregateId {
        self.campaign_id
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

/// Command to cancel a campaign that is not yet terminal.
#[derive(Debug, Clone)]
pub struct CancelCampaign {
    pub campaign_id: AggregateId,
    pub reason: Option<String>,
    pub correlation_id: Option<CorrelationId>,
}

impl CancelCampaign {
    /// Creates a new CancelCampaign command.
    pub fn new(campaign_id: AggregateId, reason: Option<String>) -> Self {
        Self {
            campaign_id,
            reason,
            correlation_id: None,
        }
    }
}

impl Command for CancelCampaign {
    type Aggregate = Campaign;

    fn aggregate_id(&self) -> AggregateId {
        self.campaign_id
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

/// Command to add to the counters of an active campaign.
#[derive(Debug, Clone)]
pub struct UpdateMetrics {
    pub campaign_id: AggregateId,
    pub sales_delta: i64,
    pub engagement_delta: i64,
    pub budget_spent_delta: Money,
    pub correlation_id: Option<CorrelationId>,
}

impl UpdateMetrics {
    /// Creates a new UpdateMetrics command.
    pub fn new(
        campaign_id: AggregateId,
        sales_delta: i64,
        engagement_delta: i64,
        budget_spent_delta: Money,
    ) -> Self {
        Self {
            campaign_id,
            sales_delta,
            engagement_delta,
            budget_spent_delta,
            correlation_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        non_negative("sales_delta", self.sales_delta)?;
        non_negative("engagement_delta", self.engagement_delta)?;
        non_negative("budget_spent_delta", self.budget_spent_delta.cents())?;
        if self.sales_delta == 0 && self.engagement_delta == 0 && self.budget_spent_delta.is_zero()
        {
            return Err(ValidationError::EmptyMetricsUpdate);
        }
        Ok(())
    }
}

impl Command for UpdateMetrics {
    type Aggregate = Campaign;

    fn aggregate_id(&self) -> AggregateId {
        self.campaign_id
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(())
}

/// Every command the campaign service accepts.
#[derive(Debug, Clone)]
pub enum CampaignCommand {
    Create(CreateCampaign),
    Schedule(ScheduleCampaign),
    Activate(ActivateCampaign),
    Pause(PauseCampaign),
    Finalize(FinalizeCampaign),
    Cancel(CancelCampaign),
    UpdateMetrics(UpdateMetrics),
}

impl CampaignCommand {
    /// Short name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            CampaignCommand::Create(_) => "create",
            CampaignCommand::Schedule(_) => "schedule",
            CampaignCommand::Activate(_) => "activate",
            CampaignCommand::Pause(_) => "pause",
            CampaignCommand::Finalize(_) => "finalize",
            CampaignCommand::Cancel(_) => "cancel",
            CampaignCommand::UpdateMetrics(_) => "update_metrics",
        }
    }

    pub fn campaign_id(&self) -> AggregateId {
        match self {
            CampaignCommand::Create(cmd) => cmd.aggregate_id(),
            CampaignCommand::Schedule(cmd) => cmd.aggregate_id(),
            CampaignCommand::Activate(cmd) => cmd.aggregate_id(),
            CampaignCommand::Pause(cmd) => cmd.aggregate_id(),
            CampaignCommand::Finalize(cmd) => cmd.aggregate_id(),
            CampaignCommand::Cancel(cmd) => cmd.aggregate_id(),
            CampaignCommand::UpdateMetrics(cmd) => cmd.aggregate_id(),
        }
    }

    /// Checks the command fields before any store is touched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            CampaignCommand::Create(cmd) => cmd.validate(),
            CampaignCommand::Schedule(cmd) => cmd.validate(),
            CampaignCommand::UpdateMetrics(cmd) => cmd.validate(),
            CampaignCommand::Activate(_)
            | CampaignCommand::Pause(_)
            | CampaignCommand::Finalize(_)
            | CampaignCommand::Cancel(_) => Ok(()),
        }
    }
}
