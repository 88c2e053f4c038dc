//! Projection maintenance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use projections::{ConsistencyReport, RebuildReport};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /admin/projection/consistency: compare the read model with the outbox log.
#[tracing::instrument(skip(state))]
pub async fn consistency(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConsistencyReport>, ApiError> {
    Ok(Json(state.rebuilder.verify_consistency().await?))
}

/// POST /admin/projection/rebuild: replay the outbox log into the read model.
#[tracing::instrument(skip(state))]
pub async fn rebuild(State(state): State<Arc<AppState>>) -> Result<Json<RebuildReport>, ApiError> {
    Ok(Json(state.rebuilder.rebuild().await?))
}
