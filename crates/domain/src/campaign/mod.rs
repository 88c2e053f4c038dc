//! Campaign aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Campaign;
pub use commands::*;
pub use events::{
    CampaignActivatedData, CampaignCancelledData, CampaignCreatedData, CampaignEvent,
    CampaignFinalizedData, CampaignMetricsUpdatedData, CampaignPausedData, CampaignScheduledData,
};
pub use service::CampaignService;
pub use state::{CampaignAction, CampaignStatus};
pub use value_objects::{BrandId, CampaignType, Money, Objective};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors the campaign aggregate reports for rejected commands.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CampaignError {
    /// The campaign is not in a status the action may be performed from.
    #[error(
        "Invalid state transition: cannot {action} a campaign in {current} status (requires {})",
        status_list(.required)
    )]
    InvalidTransition {
        current: CampaignStatus,
        action: CampaignAction,
        required: &'static [CampaignStatus],
    },

    /// A create command targeted a campaign that already exists.
    #[error("Campaign already created")]
    AlreadyCreated,

    /// A lifecycle command targeted a campaign that was never created.
    #[error("Campaign not created")]
    NotCreated,

    /// The command failed field validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl CampaignError {
    pub(crate) fn invalid_transition(current: CampaignStatus, action: CampaignAction) -> Self {
        CampaignError::InvalidTransition {
            current,
            action,
            required: action.allowed_from(),
        }
    }
}

fn status_list(statuses: &[CampaignStatus]) -> String {
    statuses
        .iter()
        .map(CampaignStatus::as_str)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Malformed or missing command fields.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("name is required")]
    NameRequired,

    #[error("brand ID is required")]
    BrandIdRequired,

    #[error("end date {end} must be after start date {start}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("metrics update must change at least one counter")]
    EmptyMetricsUpdate,

    #[error("{field} would overflow (current {current}, delta {delta})")]
    CounterOverflow {
        field: &'static str,
        current: i64,
        delta: i64,
    },

    #[error("unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_names_current_and_required() {
        let err = CampaignError::invalid_transition(CampaignStatus::Draft, CampaignAction::Activate);
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot activate a campaign in DRAFT status \
             (requires SCHEDULED or PAUSED)"
        );
    }
}
