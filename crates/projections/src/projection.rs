//! The pure projection step: how one event changes one read row.

use common::EventEnvelope;
use domain::CampaignEvent;

use crate::view::CampaignView;

/// What applying an event to the current row amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Projected {
    /// Write this row; its version is the event's version.
    Upsert(CampaignView),

    /// The row is already at or beyond the event's version.
    Stale,

    /// A non-create event arrived for a campaign with no row.
    MissingRow,
}

/// Decides the effect of `event` (carried by `envelope`) on `current`.
///
/// The comparison against `last_applied_version` is the only idempotency
/// mechanism: an event at or below the watermark never changes the row.
pub fn project(
    current: Option<&CampaignView>,
    envelope: &EventEnvelope,
    event: &CampaignEvent,
) -> Projected {
    let version = envelope.version;

    match (current, event) {
        (Some(row), _) if row.last_applied_version >= version => Projected::Stale,
        (None, CampaignEvent::CampaignCreated(data)) => Projected::Upsert(CampaignView::created(
            envelope.aggregate_id,
            data,
            version,
            envelope.timestamp,
        )),
        (None, _) => Projected::MissingRow,
        (Some(row), event) => {
            let mut view = row.clone();
            view.apply_fields(event);
            view.last_applied_version = version;
            view.last_activity_at = envelope.timestamp;
            Projected::Upsert(view)
        }
    }
}
