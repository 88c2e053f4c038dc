//! Outbox operator endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use outbox::{
    OutboxEvent, OutboxId, OutboxQuery, OutboxStats, OutboxStatus, OutboxStore, RequeueFilter,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Rows returned by `GET /outbox` when no limit is given.
const DEFAULT_LIMIT: usize = 100;

#[derive(Deserialize, Default)]
pub struct OutboxParams {
    pub status: Option<String>,
    pub aggregate_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize, Default)]
pub struct RequeueRequest {
    /// Only these rows; every failed row when absent.
    pub ids: Option<Vec<Uuid>>,
    pub aggregate_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct RequeueResponse {
    pub requeued: u64,
}

/// GET /outbox: list rows, oldest first.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OutboxParams>,
) -> Result<Json<Vec<OutboxEvent>>, ApiError> {
    let mut query = OutboxQuery::new().limit(params.limit.unwrap_or(DEFAULT_LIMIT));
    if let Some(status) = params.status {
        let status: OutboxStatus = status
            .parse()
            .map_err(|e: outbox::UnknownStatus| ApiError::BadRequest(e.to_string()))?;
        query = query.status(status);
    }
    if let Some(id) = params.aggregate_id {
        query = query.aggregate_id(parse_aggregate_id(&id)?);
    }
    if let Some(event_type) = params.event_type {
        query = query.event_type(event_type);
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    Ok(Json(state.outbox.query(query).await?))
}

/// GET /outbox/stats: row counts per status.
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<OutboxStats>, ApiError> {
    Ok(Json(state.outbox.stats().await?))
}

/// POST /outbox/requeue: promote FAILED rows back to PENDING.
#[tracing::instrument(skip(state, req))]
pub async fn requeue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequeueRequest>,
) -> Result<Json<RequeueResponse>, ApiError> {
    let filter = RequeueFilter {
        ids: req
            .ids
            .map(|ids| ids.into_iter().map(OutboxId::from_uuid).collect()),
        aggregate_id: req.aggregate_id.map(common::AggregateId::from_uuid),
    };
    let requeued = state.outbox.requeue_failed(filter).await?;
    tracing::info!(requeued, "failed outbox rows requeued");
    Ok(Json(RequeueResponse { requeued }))
}
