//! Domain layer for campaign management.
//!
//! This crate provides the write side of the system:
//! - Aggregate and DomainEvent traits
//! - Command trait and CommandHandler, which commit the new aggregate state
//!   and its outbox row in one transaction
//! - Campaign aggregate with its lifecycle state machine
//! - CampaignService with a closed `CampaignCommand` enum

pub mod aggregate;
pub mod campaign;
pub mod command;
pub mod error;

pub use aggregate::{Aggregate, DomainEvent};
pub use campaign::{
    ActivateCampaign, BrandId, Campaign, CampaignAction, CampaignActivatedData,
    CampaignCancelledData, CampaignCommand, CampaignCreatedData, CampaignError, CampaignEvent,
    CampaignFinalizedData, CampaignMetricsUpdatedData, CampaignPausedData, CampaignScheduledData,
    CampaignService, CampaignStatus, CampaignType, CancelCampaign, CreateCampaign,
    FinalizeCampaign, Money, Objective, PauseCampaign, ScheduleCampaign, UpdateMetrics,
    ValidationError,
};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::DomainError;
