//! Campaign lifecycle state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// The status of a campaign in its lifecycle.
///
/// State transitions:
/// ```text
/// Draft ──► Scheduled ──► Active ◄──► Paused
///   │           │           │  │        │  │
///   │           │           │  └──► Finalized ◄┘
///   └───────────┴───────────┴───────────┴──► Cancelled
/// ```
///
/// `UpdateMetrics` is a self-loop on `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    /// Campaign is being prepared.
    #[default]
    Draft,

    /// Dates are set, waiting to go live.
    Scheduled,

    /// Campaign is live and collecting metrics.
    Active,

    /// Temporarily stopped, can be resumed.
    Paused,

    /// Campaign ran to completion (terminal state).
    Finalized,

    /// Campaign was cancelled (terminal state).
    Cancelled,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 6] = [
        CampaignStatus::Draft,
        CampaignStatus::Scheduled,
        CampaignStatus::Active,
        CampaignStatus::Paused,
        CampaignStatus::Finalized,
        CampaignStatus::Cancelled,
    ];

    /// Returns true if `action` may be performed from this status.
    pub fn allows(&self, action: CampaignAction) -> bool {
        action.allowed_from().contains(self)
    }

    /// Returns the status reached by performing `action`, or None if the
    /// action is not allowed from this status.
    pub fn transition(&self, action: CampaignAction) -> Option<CampaignStatus> {
        self.allows(action).then_some(action.target())
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Finalized | CampaignStatus::Cancelled)
    }

    /// Returns the status name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Scheduled => "SCHEDULED",
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Finalized => "FINALIZED",
            CampaignStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownValue {
                kind: "status",
                value: s.to_string(),
            })
    }
}

/// A lifecycle action requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CampaignAction {
    Schedule,
    Activate,
    Pause,
    Finalize,
    Cancel,
    UpdateMetrics,
}

impl CampaignAction {
    pub const ALL: [CampaignAction; 6] = [
        CampaignAction::Schedule,
        CampaignAction::Activate,
        CampaignAction::Pause,
        CampaignAction::Finalize,
        CampaignAction::Cancel,
        CampaignAction::UpdateMetrics,
    ];

    /// The statuses this action may be performed from.
    pub fn allowed_from(&self) -> &'static [CampaignStatus] {
        use CampaignStatus::*;
        match self {
            CampaignAction::Schedule => &[Draft],
            CampaignAction::Activate => &[Scheduled, Paused],
            CampaignAction::Pause => &[Active],
            CampaignAction::Finalize => &[Active, Paused],
            CampaignAction::Cancel => &[Draft, Scheduled, Active, Paused],
            CampaignAction::UpdateMetrics => &[Active],
        }
    }

    /// The status a successful action leads to.
    pub fn target(&self) -> CampaignStatus {
        match self {
            CampaignAction::Schedule => CampaignStatus::Scheduled,
            CampaignAction::Activate | CampaignAction::UpdateMetrics => CampaignStatus::Active,
            CampaignAction::Pause => CampaignStatus::Paused,
            CampaignAction::Finalize => CampaignStatus::Finalized,
            CampaignAction::Cancel => CampaignStatus::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignAction::Schedule => "schedule",
            CampaignAction::Activate => "activate",
            CampaignAction::Pause => "pause",
            CampaignAction::Finalize => "finalize",
            CampaignAction::Cancel => "cancel",
            CampaignAction::UpdateMetrics => "update metrics of",
        }
    }
}

impl std::fmt::Display for CampaignAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_draft() {
        assert_eq!(CampaignStatus::default(), CampaignStatus::Draft);
    }

    #[test]
    fn test_valid_transitions() {
        use CampaignAction::*;
        use CampaignStatus::*;

        let valid = [
            (Draft, Schedule, Scheduled),
            (Scheduled, Activate, Active),
            (Active, Pause, Paused),
            (Active, Finalize, Finalized),
            (Paused, Finalize, Finalized),
            (Paused, Activate, Active),
            (Draft, Cancel, Cancelled),
            (Scheduled, Cancel, Cancelled),
            (Active, Cancel, Cancelled),
            (Paused, Cancel, Cancelled),
            (Active, UpdateMetrics, Active),
        ];

        for status in CampaignStatus::ALL {
            for action in CampaignAction::ALL {
                let expected = valid
                    .iter()
                    .find(|(from, a, _)| *from == status && *a == action)
                    .map(|(_, _, to)| *to);
                assert_eq!(
                    status.transition(action),
                    expected,
                    "{status} --{action}-->"
                );
            }
        }
    }

    #[test]
    fn test_terminal_statuses_allow_nothing() {
        for status in [CampaignStatus::Finalized, CampaignStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(CampaignAction::ALL.iter().all(|a| !status.allows(*a)));
        }
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(CampaignStatus::Active).unwrap(),
            serde_json::json!("ACTIVE")
        );
        assert_eq!(
            "paused".parse::<CampaignStatus>().unwrap(),
            CampaignStatus::Paused
        );
        assert!("archived".parse::<CampaignStatus>().is_err());
    }
}
