//! Value objects for the campaign domain.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationError;

/// Unique identifier for the brand that owns a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandId(Uuid);

impl BrandId {
    /// Creates a new random brand ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a brand ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true for the all-zero UUID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for BrandId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BrandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BrandId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Money amount represented in cents to avoid floating point issues.
///
/// Serialized as a bare integer number of cents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new Money amount from a whole-unit value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.0.abs() / 100, self.0.abs() % 100)
    }
}

/// Kind of campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    #[default]
    Affiliate,
    Influencer,
    Loyalty,
    B2b,
    Mixed,
}

impl CampaignType {
    pub const ALL: [CampaignType; 5] = [
        CampaignType::Affiliate,
        CampaignType::Influencer,
        CampaignType::Loyalty,
        CampaignType::B2b,
        CampaignType::Mixed,
    ];

    /// Returns the wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::Affiliate => "affiliate",
            CampaignType::Influencer => "influencer",
            CampaignType::Loyalty => "loyalty",
            CampaignType::B2b => "b2b",
            CampaignType::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for CampaignType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownValue {
                kind: "campaign type",
                value: s.to_string(),
            })
    }
}

/// Business objective of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Sales,
    BrandAwareness,
    Engagement,
    LeadGeneration,
    Conversion,
}

impl Objective {
    pub const ALL: [Objective; 5] = [
        Objective::Sales,
        Objective::BrandAwareness,
        Objective::Engagement,
        Objective::LeadGeneration,
        Objective::Conversion,
    ];

    /// Returns the wire name of the objective.
    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Sales => "sales",
            Objective::BrandAwareness => "brand_awareness",
            Objective::Engagement => "engagement",
            Objective::LeadGeneration => "lead_generation",
            Objective::Conversion => "conversion",
        }
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownValue {
                kind: "objective",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1050).to_string(), "10.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::from_dollars(3).cents(), 300);
    }

    #[test]
    fn test_money_serializes_as_cents() {
        assert_eq!(serde_json::to_value(Money::from_cents(250)).unwrap(), 250);
    }

    #[test]
    fn test_campaign_type_wire_names() {
        assert_eq!(
            serde_json::to_value(CampaignType::B2b).unwrap(),
            serde_json::json!("b2b")
        );
        assert_eq!("Influencer".parse::<CampaignType>().unwrap(), CampaignType::Influencer);
        assert!("radio".parse::<CampaignType>().is_err());
    }

    #[test]
    fn test_objective_wire_names() {
        for objective in Objective::ALL {
            let json = serde_json::to_value(objective).unwrap();
            assert_eq!(json, serde_json::json!(objective.as_str()));
            assert_eq!(objective.as_str().parse::<Objective>().unwrap(), objective);
        }
    }
}
