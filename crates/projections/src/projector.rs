//! The event projector: decodes broker messages and applies them to the
//! read model.

use common::EventEnvelope;
use domain::{CampaignEvent, DomainEvent};
use tracing::{debug, info, instrument, warn};

use crate::Result;
use crate::projection::Projected;
use crate::store::ReadModelStore;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The row was written at the event's version.
    Applied,
    /// The row was already at or beyond the event's version.
    Stale,
    /// No row exists for a non-create event; the event was dropped.
    MissingRow,
    /// The event type is not a campaign event; the event was dropped.
    Ignored,
}

/// Applies campaign events to a read model store.
///
/// Every outcome is final: the caller acknowledges the message. Only an
/// `Err` (undecodable data or a store failure) warrants redelivery.
pub struct EventProjector<R: ReadModelStore> {
    store: R,
}

impl<R: ReadModelStore> EventProjector<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    /// Decodes a broker payload and applies it.
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<ApplyOutcome> {
        let envelope = EventEnvelope::from_slice(payload)?;
        self.handle_envelope(&envelope).await
    }

    /// Applies one envelope.
    #[instrument(
        skip(self, envelope),
        fields(
            event_type = %envelope.event_type,
            aggregate_id = %envelope.aggregate_id,
            version = %envelope.version
        )
    )]
    pub async fn handle_envelope(&self, envelope: &EventEnvelope) -> Result<ApplyOutcome> {
        let Some(event) = CampaignEvent::from_envelope(envelope)? else {
            info!("unknown event type, ignored");
            metrics::counter!("projector_events_ignored_total", "reason" => "unknown_type")
                .increment(1);
            return Ok(ApplyOutcome::Ignored);
        };

        let outcome = match self.store.apply(envelope, &event).await? {
            Projected::Upsert(view) => {
                debug!(status = %view.status, "event applied");
                metrics::counter!("projector_events_applied_total", "event_type" => event.event_type())
                    .increment(1);
                ApplyOutcome::Applied
            }
            Projected::Stale => {
                info!("stale or duplicate event discarded");
                metrics::counter!("projector_events_stale_total").increment(1);
                ApplyOutcome::Stale
            }
            Projected::MissingRow => {
                warn!("no read row for campaign, event dropped");
                metrics::counter!("projector_events_ignored_total", "reason" => "missing_row")
                    .increment(1);
                ApplyOutcome::MissingRow
            }
        };

        Ok(outcome)
    }
}
