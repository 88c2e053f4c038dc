//! Shared application state.

use std::sync::Arc;

use domain::CampaignService;
use outbox::CampaignStore;
use projections::{CampaignQueries, ProjectionRebuilder, ReadModelStore};

/// Write store shared by the command side, the dispatcher and the outbox endpoints.
pub type SharedStore = Arc<dyn CampaignStore>;

/// Read model shared by the projector and the query endpoints.
pub type SharedReadModel = Arc<dyn ReadModelStore>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub campaigns: CampaignService<SharedStore>,
    pub queries: CampaignQueries<SharedReadModel>,
    pub outbox: SharedStore,
    pub rebuilder: ProjectionRebuilder<SharedStore, SharedReadModel>,
}

impl AppState {
    pub fn new(store: SharedStore, read_model: SharedReadModel) -> Self {
        Self {
            campaigns: CampaignService::new(store.clone()),
            queries: CampaignQueries::new(read_model.clone()),
            rebuilder: ProjectionRebuilder::new(store.clone(), read_model),
            outbox: store,
        }
    }
}
