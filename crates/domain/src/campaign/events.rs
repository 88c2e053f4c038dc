//! Campaign domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{BrandId, CampaignStatus, CampaignType, Money, Objective};

/// Events that can occur on a campaign aggregate.
///
/// The variant name is the `event_type` of the envelope and the variant's
/// data struct is the envelope `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data")]
pub enum CampaignEvent {
    /// Campaign was created in DRAFT.
    CampaignCreated(CampaignCreatedData),

    /// Start and end dates were set.
    CampaignScheduled(CampaignScheduledData),

    /// Campaign went live, or resumed after a pause.
    CampaignActivated(CampaignActivatedData),

    /// Campaign was paused.
    CampaignPaused(CampaignPausedData),

    /// Campaign ran to completion.
    CampaignFinalized(CampaignFinalizedData),

    /// Campaign was cancelled.
    CampaignCancelled(CampaignCancelledData),

    /// Sales, engagement or spend counters advanced.
    CampaignMetricsUpdated(CampaignMetricsUpdatedData),
}

impl DomainEvent for CampaignEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "CampaignCreated",
        "CampaignScheduled",
        "CampaignActivated",
        "CampaignPaused",
        "CampaignFinalized",
        "CampaignCancelled",
        "CampaignMetricsUpdated",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            CampaignEvent::CampaignCreated(_) => "CampaignCreated",
            CampaignEvent::CampaignScheduled(_) => "CampaignScheduled",
            CampaignEvent::CampaignActivated(_) => "CampaignActivated",
            CampaignEvent::CampaignPaused(_) => "CampaignPaused",
            CampaignEvent::CampaignFinalized(_) => "CampaignFinalized",
            CampaignEvent::CampaignCancelled(_) => "CampaignCancelled",
            CampaignEvent::CampaignMetricsUpdated(_) => "CampaignMetricsUpdated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CampaignEvent::CampaignCreated(d) => d.created_at,
            CampaignEvent::CampaignScheduled(d) => d.scheduled_at,
            CampaignEvent::CampaignActivated(d) => d.activated_at,
            CampaignEvent::CampaignPaused(d) => d.paused_at,
            CampaignEvent::CampaignFinalized(d) => d.finalized_at,
            CampaignEvent::CampaignCancelled(d) => d.cancelled_at,
            CampaignEvent::CampaignMetricsUpdated(d) => d.updated_at,
        }
    }
}

impl CampaignEvent {
    /// Returns the campaign this event belongs to.
    pub fn campaign_id(&self) -> AggregateId {
        match self {
            CampaignEvent::CampaignCreated(d) => d.campaign_id,
            CampaignEvent::CampaignScheduled(d) => d.campaign_id,
            CampaignEvent::CampaignActivated(d) => d.campaign_id,
            CampaignEvent::CampaignPaused(d) => d.campaign_id,
            CampaignEvent::CampaignFinalized(d) => d.campaign_id,
            CampaignEvent::CampaignCancelled(d) => d.campaign_id,
            CampaignEvent::CampaignMetricsUpdated(d) => d.campaign_id,
        }
    }

    /// Returns the status the campaign is in after this event.
    pub fn resulting_status(&self) -> CampaignStatus {
        match self {
            CampaignEvent::CampaignCreated(_) => CampaignStatus::Draft,
            CampaignEvent::CampaignScheduled(_) => CampaignStatus::Scheduled,
            CampaignEvent::CampaignActivated(_) | CampaignEvent::CampaignMetricsUpdated(_) => {
                CampaignStatus::Active
            }
            CampaignEvent::CampaignPaused(_) => CampaignStatus::Paused,
            CampaignEvent::CampaignFinalized(_) => CampaignStatus::Finalized,
            CampaignEvent::CampaignCancelled(_) => CampaignStatus::Cancelled,
        }
    }

    /// Creates a CampaignScheduled event.
    pub fn scheduled(
        campaign_id: AggregateId,
        brand_id: BrandId,
        name: String,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        CampaignEvent::CampaignScheduled(CampaignScheduledData {
            campaign_id,
            brand_id,
            name,
            start_date,
            end_date,
            scheduled_at: Utc::now(),
        })
    }

    /// Creates a CampaignActivated event.
    pub fn activated(
        campaign_id: AggregateId,
        brand_id: BrandId,
        name: String,
        resumed: bool,
    ) -> Self {
        CampaignEvent::CampaignActivated(CampaignActivatedData {
            campaign_id,
            brand_id,
            name,
            resumed,
            activated_at: Utc::now(),
        })
    }

    /// Creates a CampaignPaused event.
    pub fn paused(
        campaign_id: AggregateId,
        brand_id: BrandId,
        name: String,
        reason: Option<String>,
    ) -> Self {
        CampaignEvent::CampaignPaused(CampaignPausedData {
            campaign_id,
            brand_id,
            name,
            reason,
            paused_at: Utc::now(),
        })
    }

    /// Creates a CampaignFinalized event.
    pub fn finalized(
        campaign_id: AggregateId,
        brand_id: BrandId,
        name: String,
        reason: Option<String>,
    ) -> Self {
        CampaignEvent::CampaignFinalized(CampaignFinalizedData {
            campaign_id,
            brand_id,
            name,
            reason,
            finalized_at: Utc::now(),
        })
    }

    /// Creates a CampaignCancelled event.
    pub fn cancelled(
        campaign_id: AggregateId,
        brand_id: BrandId,
        name: String,
        reason: Option<String>,
        previous_status: CampaignStatus,
    ) -> Self {
        CampaignEvent::CampaignCancelled(CampaignCancelledData {
            campaign_id,
            brand_id,
            name,
            reason,
            previous_status,
            cancelled_at: Utc::now(),
        })
    }
}

/// Data for CampaignCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignCreatedData {
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub objective: Objective,
    /// Total budget in cents.
    #[serde(default)]
    pub total_budget: Money,
    #[serde(default)]
    pub sales_target: i64,
    #[serde(default)]
    pub engagement_target: i64,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub channels: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data for CampaignScheduled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignScheduledData {
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

/// Data for CampaignActivated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignActivatedData {
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    /// True when the campaign was resumed from PAUSED.
    #[serde(default)]
    pub resumed: bool,
    pub activated_at: DateTime<Utc>,
}

/// Data for CampaignPaused event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPausedData {
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub paused_at: DateTime<Utc>,
}

/// Data for CampaignFinalized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignFinalizedData {
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub finalized_at: DateTime<Utc>,
}

/// Data for CampaignCancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignCancelledData {
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub previous_status: CampaignStatus,
    pub cancelled_at: DateTime<Utc>,
}

/// Data for CampaignMetricsUpdated event.
///
/// Carries both the deltas of this update and the accumulated totals after
/// it, so consumers can set absolute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetricsUpdatedData {
    pub campaign_id: AggregateId,
    pub brand_id: BrandId,
    pub name: String,
    pub sales_delta: i64,
    pub engagement_delta: i64,
    pub budget_spent_delta: Money,
    pub sales_actual: i64,
    pub engagement_actual: i64,
    pub budget_spent: Money,
    pub updated_at: DateTime<Utc>,
}
