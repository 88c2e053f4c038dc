//! Rebuilding the read model from the outbox log, and checking it against
//! that log.

use std::collections::{HashMap, HashSet};

use common::{AggregateId, Version};
use domain::CampaignStatus;
use futures_util::StreamExt;
use outbox::OutboxStore;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::memory::InMemoryReadModel;
use crate::projector::{ApplyOutcome, EventProjector};
use crate::store::ReadModelStore;
use crate::view::{CampaignFilter, CampaignView};
use crate::{ProjectionError, Result};

/// Counts from one rebuild pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub events: u64,
    pub applied: u64,
    pub stale: u64,
    pub missing: u64,
    pub ignored: u64,
    /// Rows whose payload could not be decoded; skipped.
    pub failed: u64,
}

impl RebuildReport {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Stale => self.stale += 1,
            ApplyOutcome::MissingRow => self.missing += 1,
            ApplyOutcome::Ignored => self.ignored += 1,
        }
    }
}

/// A campaign whose read row disagrees with the outbox log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub id: AggregateId,
    pub expected_status: CampaignStatus,
    pub actual_status: CampaignStatus,
    pub expected_version: Version,
    pub actual_version: Version,
}

/// Differences between the read model and a replay of the outbox log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub checked: usize,
    /// Campaigns in the log with no read row.
    pub missing: Vec<AggregateId>,
    /// Read rows with no campaign in the log.
    pub extra: Vec<AggregateId>,
    pub mismatched: Vec<Mismatch>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.mismatched.is_empty()
    }
}

/// Replays the outbox log into a read model.
///
/// The outbox keeps every row, so it doubles as the durable event log.
/// Replay does not clear the target: versioned applies make it safe to run
/// over a populated read model.
pub struct ProjectionRebuilder<S, R> {
    outbox: S,
    read_model: R,
}

impl<S: OutboxStore, R: ReadModelStore> ProjectionRebuilder<S, R> {
    pub fn new(outbox: S, read_model: R) -> Self {
        Self { outbox, read_model }
    }

    /// Replays every outbox row, in insertion order, into the read model.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let report = replay(&self.outbox, &self.read_model).await?;
        info!(
            events = report.events,
            applied = report.applied,
            stale = report.stale,
            failed = report.failed,
            "read model rebuilt"
        );
        Ok(report)
    }

    /// Compares the read model with a fresh replay of the outbox log.
    ///
    /// Rows still waiting in the outbox or the broker show up as version
    /// mismatches until the projector catches up.
    #[instrument(skip(self))]
    pub async fn verify_consistency(&self) -> Result<ConsistencyReport> {
        let expected = InMemoryReadModel::new();
        replay(&self.outbox, &expected).await?;

        let expected: HashMap<AggregateId, CampaignView> = expected
            .list(&CampaignFilter::default())
            .await?
            .into_iter()
            .map(|view| (view.id, view))
            .collect();
        let actual = self.read_model.list(&CampaignFilter::default()).await?;

        let mut report = ConsistencyReport {
            checked: expected.len(),
            ..ConsistencyReport::default()
        };
        let mut seen = HashSet::with_capacity(actual.len());
        for row in actual {
            seen.insert(row.id);
            let Some(want) = expected.get(&row.id) else {
                report.extra.push(row.id);
                continue;
            };
            if want.status != row.status || want.last_applied_version != row.last_applied_version
            {
                report.mismatched.push(Mismatch {
                    id: row.id,
                    expected_status: want.status,
                    actual_status: row.status,
                    expected_version: want.last_applied_version,
                    actual_version: row.last_applied_version,
                });
            }
        }
        report.missing = expected
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect();
        report.missing.sort();

        if !report.is_consistent() {
            warn!(
                missing = report.missing.len(),
                extra = report.extra.len(),
                mismatched = report.mismatched.len(),
                "read model differs from the outbox log"
            );
        }
        Ok(report)
    }
}

async fn replay<S: OutboxStore, R: ReadModelStore>(outbox: &S, target: R) -> Result<RebuildReport> {
    let projector = EventProjector::new(target);
    let mut report = RebuildReport::default();
    let mut rows = outbox.stream_all().await?;

    while let Some(row) = rows.next().await {
        let row = row?;
        report.events += 1;

        let outcome = match row.envelope() {
            Ok(envelope) => projector.handle_envelope(&envelope).await,
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(outcome) => report.record(outcome),
            Err(ProjectionError::Decode(e)) => {
                warn!(outbox_id = %row.id, error = %e, "undecodable outbox row skipped");
                report.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{BrandId, CampaignService, CampaignType, CreateCampaign, Objective};
    use outbox::InMemoryStore;

    async fn seed(store: &InMemoryStore) -> AggregateId {
        let service = CampaignService::new(store.clone());
        let created = service
            .create_campaign(CreateCampaign::new(
                BrandId::new(),
                "Launch",
                CampaignType::Influencer,
                Objective::BrandAwareness,
            ))
            .await
            .unwrap();
        created.envelope.aggregate_id
    }

    #[tokio::test]
    async fn rebuild_replays_log_and_is_repeatable() {
        let store = InMemoryStore::new();
        let id = seed(&store).await;
        let read_model = InMemoryReadModel::new();
        let rebuilder = ProjectionRebuilder::new(store, read_model.clone());

        let first = rebuilder.rebuild().await.unwrap();
        assert_eq!((first.events, first.applied), (1, 1));
        let second = rebuilder.rebuild().await.unwrap();
        assert_eq!((second.events, second.stale), (1, 1));

        let view = read_model.get(id).await.unwrap().unwrap();
        assert_eq!(view.status, CampaignStatus::Draft);
        assert_eq!(view.last_applied_version, Version::first());
    }

    #[tokio::test]
    async fn consistency_reports_lagging_and_missing_rows() {
        let store = InMemoryStore::new();
        let id = seed(&store).await;
        let read_model = InMemoryReadModel::new();
        let rebuilder = ProjectionRebuilder::new(store, read_model.clone());

        let report = rebuilder.verify_consistency().await.unwrap();
        assert_eq!(report.missing, vec![id]);
        assert!(!report.is_consistent());

        rebuilder.rebuild().await.unwrap();
        let report = rebuilder.verify_consistency().await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn corrupt_rows_are_counted_and_skipped() {
        let store = InMemoryStore::new();
        seed(&store).await;
        seed(&store).await;
        let first = store.query(outbox::OutboxQuery::new()).await.unwrap()[0].id;
        store.corrupt_payload(first, "{not json").await;

        let rebuilder = ProjectionRebuilder::new(store, InMemoryReadModel::new());
        let report = rebuilder.rebuild().await.unwrap();

        assert_eq!((report.events, report.applied, report.failed), (2, 1, 1));
    }
}
