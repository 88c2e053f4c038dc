use crate::{AggregateId, OutboxId, OutboxStatus};

/// Builder for listing outbox rows.
///
/// Rows are returned in insertion order.
#[derive(Debug, Clone, Default)]
pub struct OutboxQuery {
    /// Filter by dispatch status.
    pub status: Option<OutboxStatus>,

    /// Filter by aggregate ID.
    pub aggregate_id: Option<AggregateId>,

    /// Filter by event type.
    pub event_type: Option<String>,

    /// Maximum number of rows to return.
    pub limit: Option<usize>,

    /// Number of rows to skip.
    pub offset: Option<usize>,
}

impl OutboxQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for rows in a given status.
    pub fn with_status(status: OutboxStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Creates a query for a specific aggregate.
    pub fn for_aggregate(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: OutboxStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Limits the number of rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first N rows.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Selects which FAILED rows an operator requeue promotes back to PENDING.
#[derive(Debug, Clone, Default)]
pub struct RequeueFilter {
    /// Only these rows. `None` means every failed row.
    pub ids: Option<Vec<OutboxId>>,

    /// Only rows of this aggregate.
    pub aggregate_id: Option<AggregateId>,
}

impl RequeueFilter {
    /// Every failed row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: Vec<OutboxId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn aggregate(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        }
    }

    /// Returns true if a failed row with this ID and aggregate is selected.
    pub fn matches(&self, id: OutboxId, aggregate_id: AggregateId) -> bool {
        let id_selected = self.ids.as_ref().is_none_or(|ids| ids.contains(&id));
        let aggregate_selected = self.aggregate_id.is_none_or(|a| a == aggregate_id);
        id_selected && aggregate_selected
    }
}

/// Row counts per dispatch status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub published: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder() {
        let id = AggregateId::new();
        let query = OutboxQuery::with_status(OutboxStatus::Failed)
            .aggregate_id(id)
            .event_type("CampaignPaused")
            .limit(10)
            .offset(5);

        assert_eq!(query.status, Some(OutboxStatus::Failed));
        assert_eq!(query.aggregate_id, Some(id));
        assert_eq!(query.event_type.as_deref(), Some("CampaignPaused"));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(5));
    }

    #[test]
    fn requeue_filter_matching() {
        let row = OutboxId::new();
        let other = OutboxId::new();
        let aggregate = AggregateId::new();

        assert!(RequeueFilter::all().matches(row, aggregate));
        assert!(RequeueFilter::ids(vec![row]).matches(row, aggregate));
        assert!(!RequeueFilter::ids(vec![other]).matches(row, aggregate));
        assert!(RequeueFilter::aggregate(aggregate).matches(row, aggregate));
        assert!(!RequeueFilter::aggregate(AggregateId::new()).matches(row, aggregate));
    }
}
