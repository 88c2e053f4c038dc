//! Campaign service providing a simplified API for campaign operations.

use common::AggregateId;
use outbox::WriteStore;

use crate::command::{Command, CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    ActivateCampaign, CancelCampaign, Campaign, CampaignCommand, CampaignError, CreateCampaign,
    FinalizeCampaign, PauseCampaign, ScheduleCampaign, UpdateMetrics, ValidationError,
};

impl From<CampaignError> for DomainError {
    fn from(e: CampaignError) -> Self {
        DomainError::Campaign(e)
    }
}

impl From<ValidationError> for DomainError {
    fn from(e: ValidationError) -> Self {
        DomainError::Campaign(CampaignError::Validation(e))
    }
}

/// Service for managing campaigns.
///
/// Every successful command writes the new campaign state and exactly one
/// outbox row in a single transaction.
pub struct CampaignService<S: WriteStore> {
    handler: CommandHandler<S, Campaign>,
}

impl<S: WriteStore> CampaignService<S> {
    /// Creates a new campaign service with the given store.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Campaign> {
        &self.handler
    }

    /// Executes any campaign command.
    #[tracing::instrument(
        skip(self, command),
        fields(command = command.name(), campaign_id = %command.campaign_id())
    )]
    pub async fn handle(
        &self,
        command: CampaignCommand,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        let name = command.name();

        let result = match command {
            CampaignCommand::Create(cmd) => self.create_campaign(cmd).await,
            CampaignCommand::Schedule(cmd) => self.schedule_campaign(cmd).await,
            CampaignCommand::Activate(cmd) => self.activate_campaign(cmd).await,
            CampaignCommand::Pause(cmd) => self.pause_campaign(cmd).await,
            CampaignCommand::Finalize(cmd) => self.finalize_campaign(cmd).await,
            CampaignCommand::Cancel(cmd) => self.cancel_campaign(cmd).await,
            CampaignCommand::UpdateMetrics(cmd) => self.update_metrics(cmd).await,
        };

        let outcome = match &result {
            Ok(done) => {
                tracing::info!(version = %done.new_version, "Campaign command applied");
                "ok"
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(error = %e, "Campaign command conflicted");
                "conflict"
            }
            Err(e @ (DomainError::Campaign(_) | DomainError::AggregateNotFound { .. })) => {
                tracing::debug!(error = %e, "Campaign command rejected");
                "rejected"
            }
            Err(e) => {
                tracing::error!(error = %e, "Campaign command failed");
                "error"
            }
        };
        metrics::counter!("campaign_commands_total", "command" => name, "outcome" => outcome)
            .increment(1);

        result
    }

    /// Creates a new campaign in DRAFT.
    #[tracing::instrument(skip(self, cmd), fields(campaign_id = %cmd.campaign_id))]
    pub async fn create_campaign(
        &self,
        cmd: CreateCampaign,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        cmd.validate()?;
        self.handler
            .create(cmd.aggregate_id(), cmd.correlation_id(), |campaign| {
                campaign.create(&cmd)
            })
            .await
    }

    /// Sets the dates of a DRAFT campaign.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_campaign(
        &self,
        cmd: ScheduleCampaign,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        cmd.validate()?;
        self.handler
            .execute(cmd.aggregate_id(), cmd.correlation_id(), |campaign| {
                campaign.schedule(cmd.start_date, cmd.end_date)
            })
            .await
    }

    /// Activates a scheduled campaign or resumes a paused one.
    #[tracing::instrument(skip(self))]
    pub async fn activate_campaign(
        &self,
        cmd: ActivateCampaign,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        self.handler
            .execute(cmd.aggregate_id(), cmd.correlation_id(), |campaign| {
                campaign.activate()
            })
            .await
    }

    /// Pauses an active campaign.
    #[tracing::instrument(skip(self))]
    pub async fn pause_campaign(
        &self,
        cmd: PauseCampaign,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        let correlation_id = cmd.correlation_id();
        self.handler
            .execute(cmd.campaign_id, correlation_id, |campaign| {
                campaign.pause(cmd.reason)
            })
            .await
    }

    /// Finalizes an active or paused campaign.
    #[tracing::instrument(skip(self))]
    pub async fn finalize_campaign(
        &self,
        cmd: FinalizeCampaign,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        let correlation_id = cmd.correlation_id();
        self.handler
            .execute(cmd.campaign_id, correlation_id, |campaign| {
                campaign.finalize(cmd.reason)
            })
            .await
    }

    /// Cancels a campaign that is not yet terminal.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_campaign(
        &self,
        cmd: CancelCampaign,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        let correlation_id = cmd.correlation_id();
        self.handler
            .execute(cmd.campaign_id, correlation_id, |campaign| {
                campaign.cancel(cmd.reason)
            })
            .await
    }

    /// Adds sales, engagement and spend deltas to an active campaign.
    #[tracing::instrument(skip(self))]
    pub async fn update_metrics(
        &self,
        cmd: UpdateMetrics,
    ) -> Result<CommandResult<Campaign>, DomainError> {
        cmd.validate()?;
        self.handler
            .execute(cmd.aggregate_id(), cmd.correlation_id(), |campaign| {
                campaign.update_metrics(
                    cmd.sales_delta,
                    cmd.engagement_delta,
                    cmd.budget_spent_delta,
                )
            })
            .await
    }

    /// Gets a campaign from the write store.
    pub async fn get_campaign(
        &self,
        campaign_id: AggregateId,
    ) -> Result<Option<Campaign>, DomainError> {
        self.handler.load_existing(campaign_id).await
    }
}
