//! Campaign command and query endpoints.
//!
//! Commands go through the write model and answer with the committed
//! version. Queries read the projected read model, which trails the write
//! model until the projector catches up.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationId};
use domain::{
    ActivateCampaign, BrandId, Campaign, CampaignCommand, CampaignStatus, CampaignType,
    CancelCampaign, CommandResult, CreateCampaign, DomainEvent, FinalizeCampaign, Money,
    Objective, PauseCampaign, ScheduleCampaign, UpdateMetrics,
};
use projections::{CampaignFilter, CampaignQuery, CampaignView};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying an optional correlation (saga) ID for commands.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub campaign_id: Option<Uuid>,
    pub brand_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: String,
    pub objective: String,
    #[serde(default)]
    pub total_budget_cents: i64,
    #[serde(default)]
    pub sales_target: i64,
    #[serde(default)]
    pub engagement_target: i64,
    pub target_audience: Option<String>,
    pub channels: Option<String>,
    pub terms: Option<String>,
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Deserialize, Default)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct MetricsRequest {
    #[serde(default)]
    pub sales_delta: i64,
    #[serde(default)]
    pub engagement_delta: i64,
    #[serde(default)]
    pub budget_spent_delta_cents: i64,
}

/// Query string of `GET /campaigns`. Every field is optional.
#[derive(Deserialize, Default)]
pub struct ListParams {
    pub brand_id: Option<Uuid>,
    pub campaign_type: Option<String>,
    pub status: Option<String>,
    pub objective: Option<String>,
    pub starts_from: Option<DateTime<Utc>>,
    pub ends_until: Option<DateTime<Utc>>,
    pub min_budget: Option<i64>,
    pub max_budget: Option<i64>,
}

impl ListParams {
    fn into_filter(self) -> Result<CampaignFilter, ApiError> {
        Ok(CampaignFilter {
            brand_id: self.brand_id.map(BrandId::from_uuid),
            campaign_type: self.campaign_type.as_deref().map(str::parse).transpose()?,
            status: self.status.as_deref().map(str::parse).transpose()?,
            objective: self.objective.as_deref().map(str::parse).transpose()?,
            starts_from: self.starts_from,
            ends_until: self.ends_until,
            min_budget: self.min_budget.map(Money::from_cents),
            max_budget: self.max_budget.map(Money::from_cents),
        })
    }
}

// -- Response types --

/// Outcome of an accepted command.
#[derive(Serialize)]
pub struct CommandResponse {
    pub campaign_id: String,
    pub status: CampaignStatus,
    pub version: i64,
    pub event_type: &'static str,
    pub outbox_id: String,
}

impl From<CommandResult<Campaign>> for CommandResponse {
    fn from(result: CommandResult<Campaign>) -> Self {
        Self {
            campaign_id: result.envelope.aggregate_id.to_string(),
            status: result.aggregate.status(),
            version: result.new_version.as_i64(),
            event_type: result.event.event_type(),
            outbox_id: result.outbox_id.to_string(),
        }
    }
}

// -- Command handlers --

/// POST /campaigns: create a campaign in DRAFT.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let campaign_type: CampaignType = req.campaign_type.parse()?;
    let objective: Objective = req.objective.parse()?;

    let mut cmd = CreateCampaign::new(
        BrandId::from_uuid(req.brand_id),
        req.name,
        campaign_type,
        objective,
    )
    .with_budget(Money::from_cents(req.total_budget_cents))
    .with_targets(req.sales_target, req.engagement_target);
    if let Some(id) = req.campaign_id {
        cmd = cmd.with_id(AggregateId::from_uuid(id));
    }
    cmd.description = req.description;
    cmd.target_audience = req.target_audience;
    cmd.channels = req.channels;
    cmd.terms = req.terms;
    cmd.correlation_id = correlation_id(&headers)?;

    let result = state.campaigns.handle(CampaignCommand::Create(cmd)).await?;
    Ok((StatusCode::CREATED, Json(result.into())))
}

/// PUT /campaigns/{id}/schedule
#[tracing::instrument(skip(state, headers, req))]
pub async fn schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let mut cmd = ScheduleCampaign::new(parse_aggregate_id(&id)?, req.start_date, req.end_date);
    cmd.correlation_id = correlation_id(&headers)?;
    run(&state, CampaignCommand::Schedule(cmd)).await
}

/// PUT /campaigns/{id}/activate
#[tracing::instrument(skip(state, headers))]
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CommandResponse>, ApiError> {
    let mut cmd = ActivateCampaign::new(parse_aggregate_id(&id)?);
    cmd.correlation_id = correlation_id(&headers)?;
    run(&state, CampaignCommand::Activate(cmd)).await
}

/// PUT /campaigns/{id}/pause
#[tracing::instrument(skip(state, headers, body))]
pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiError> {
    let req: ReasonRequest = optional_body(&body)?;
    let mut cmd = PauseCampaign::new(parse_aggregate_id(&id)?, req.reason);
    cmd.correlation_id = correlation_id(&headers)?;
    run(&state, CampaignCommand::Pause(cmd)).await
}

/// PUT /campaigns/{id}/finalize
#[tracing::instrument(skip(state, headers, body))]
pub async fn finalize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiError> {
    let req: ReasonRequest = optional_body(&body)?;
    let mut cmd = FinalizeCampaign::new(parse_aggregate_id(&id)?, req.reason);
    cmd.correlation_id = correlation_id(&headers)?;
    run(&state, CampaignCommand::Finalize(cmd)).await
}

/// PUT /campaigns/{id}/cancel
#[tracing::instrument(skip(state, headers, body))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiError> {
    let req: ReasonRequest = optional_body(&body)?;
    let mut cmd = CancelCampaign::new(parse_aggregate_id(&id)?, req.reason);
    cmd.correlation_id = correlation_id(&headers)?;
    run(&state, CampaignCommand::Cancel(cmd)).await
}

/// PUT /campaigns/{id}/metrics: add deltas to the running counters.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MetricsRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let mut cmd = UpdateMetrics::new(
        parse_aggregate_id(&id)?,
        req.sales_delta,
        req.engagement_delta,
        Money::from_cents(req.budget_spent_delta_cents),
    );
    cmd.correlation_id = correlation_id(&headers)?;
    run(&state, CampaignCommand::UpdateMetrics(cmd)).await
}

async fn run(state: &AppState, command: CampaignCommand) -> Result<Json<CommandResponse>, ApiError> {
    let result = state.campaigns.handle(command).await?;
    Ok(Json(result.into()))
}

fn correlation_id(headers: &HeaderMap) -> Result<Option<CorrelationId>, ApiError> {
    let Some(value) = headers.get(CORRELATION_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v).ok())
        .map(|uuid| Some(CorrelationId::from_uuid(uuid)))
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {CORRELATION_HEADER} header")))
}

fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid body: {e}")))
}

// -- Query handlers --

/// GET /campaigns/{id}: the projected read row.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CampaignView>, ApiError> {
    let view = state
        .queries
        .get_by_id(parse_aggregate_id(&id)?)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Campaign {id} not found")))?;
    Ok(Json(view))
}

/// GET /campaigns: list with optional filters.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<CampaignView>>, ApiError> {
    query(&state, CampaignQuery::Filter(params.into_filter()?)).await
}

/// GET /campaigns/brand/{brand_id}
#[tracing::instrument(skip(state))]
pub async fn by_brand(
    State(state): State<Arc<AppState>>,
    Path(brand_id): Path<String>,
) -> Result<Json<Vec<CampaignView>>, ApiError> {
    let brand_id = Uuid::parse_str(&brand_id)
        .map(BrandId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid brand ID '{brand_id}': {e}")))?;
    query(&state, CampaignQuery::ByBrand(brand_id)).await
}

/// GET /campaigns/type/{type}
#[tracing::instrument(skip(state))]
pub async fn by_type(
    State(state): State<Arc<AppState>>,
    Path(campaign_type): Path<String>,
) -> Result<Json<Vec<CampaignView>>, ApiError> {
    query(&state, CampaignQuery::ByType(campaign_type.parse()?)).await
}

/// GET /campaigns/status/{status}
#[tracing::instrument(skip(state))]
pub async fn by_status(
    State(state): State<Arc<AppState>>,
    Path(status): Path<String>,
) -> Result<Json<Vec<CampaignView>>, ApiError> {
    query(&state, CampaignQuery::ByStatus(status.parse()?)).await
}

/// GET /campaigns/active
#[tracing::instrument(skip(state))]
pub async fn active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CampaignView>>, ApiError> {
    query(&state, CampaignQuery::Active).await
}

async fn query(state: &AppState, query: CampaignQuery) -> Result<Json<Vec<CampaignView>>, ApiError> {
    Ok(Json(state.queries.execute(query).await?.into_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_build_filter() {
        let params = ListParams {
            status: Some("active".to_string()),
            objective: Some("brand_awareness".to_string()),
            min_budget: Some(10_000),
            ..ListParams::default()
        };

        let filter = params.into_filter().unwrap();
        assert_eq!(filter.status, Some(CampaignStatus::Active));
        assert_eq!(filter.objective, Some(Objective::BrandAwareness));
        assert_eq!(filter.min_budget, Some(Money::from_cents(10_000)));
        assert!(filter.brand_id.is_none());
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let params = ListParams {
            campaign_type: Some("billboard".to_string()),
            ..ListParams::default()
        };
        assert!(matches!(params.into_filter(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn empty_body_uses_defaults() {
        let req: ReasonRequest = optional_body(&Bytes::from_static(b"")).unwrap();
        assert!(req.reason.is_none());
        let req: ReasonRequest =
            optional_body(&Bytes::from_static(br#"{"reason":"budget cut"}"#)).unwrap();
        assert_eq!(req.reason.as_deref(), Some("budget cut"));
    }

    #[test]
    fn correlation_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert!(correlation_id(&headers).unwrap().is_none());

        let uuid = Uuid::new_v4();
        headers.insert(CORRELATION_HEADER, uuid.to_string().parse().unwrap());
        assert_eq!(
            correlation_id(&headers).unwrap(),
            Some(CorrelationId::from_uuid(uuid))
        );

        headers.insert(CORRELATION_HEADER, "nope".parse().unwrap());
        assert!(correlation_id(&headers).is_err());
    }
}
