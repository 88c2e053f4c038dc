//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CampaignError, DomainError, ValidationError};
use outbox::OutboxError;
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Command side error.
    Domain(DomainError),
    /// Read model error.
    Projection(ProjectionError),
    /// Outbox operator error.
    Outbox(OutboxError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => (domain_status(&err), err.to_string()),
            ApiError::Projection(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Outbox(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::AggregateNotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Campaign(CampaignError::Validation(_)) => StatusCode::BAD_REQUEST,
        DomainError::Campaign(
            CampaignError::InvalidTransition { .. }
            | CampaignError::AlreadyCreated
            | CampaignError::NotCreated,
        ) => StatusCode::CONFLICT,
        e if e.is_conflict() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

impl From<OutboxError> for ApiError {
    fn from(err: OutboxError) -> Self {
        ApiError::Outbox(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, Version};
    use domain::{CampaignAction, CampaignStatus};

    #[test]
    fn domain_errors_map_to_status_codes() {
        let id = AggregateId::new();
        let cases = [
            (
                DomainError::AggregateNotFound {
                    aggregate_type: "Campaign",
                    aggregate_id: id,
                },
                StatusCode::NOT_FOUND,
            ),
            (
                DomainError::Campaign(CampaignError::InvalidTransition {
                    current: CampaignStatus::Draft,
                    action: CampaignAction::Activate,
                    required: CampaignAction::Activate.allowed_from(),
                }),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::Campaign(CampaignError::Validation(ValidationError::NameRequired)),
                StatusCode::BAD_REQUEST,
            ),
            (DomainError::AlreadyExists(id), StatusCode::CONFLICT),
            (
                DomainError::Store(OutboxError::ConcurrencyConflict {
                    aggregate_id: id,
                    expected: Version::first(),
                    actual: Version::new(2),
                }),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::Store(OutboxError::InvalidChange("bad".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(domain_status(&err), status, "{err}");
        }
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let response = ApiError::from(ValidationError::BrandIdRequired).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
