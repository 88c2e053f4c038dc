//! HTTP API and process wiring for campaign management.
//!
//! Commands are accepted over REST and committed with their outbox rows;
//! queries read the projected read model. [`bootstrap`] selects the
//! backends and runs the outbox dispatcher and projector in the background.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use bootstrap::{Backends, BootstrapError, Workers};
pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/campaigns",
            post(routes::campaigns::create).get(routes::campaigns::list),
        )
        .route("/campaigns/active", get(routes::campaigns::active))
        .route("/campaigns/brand/{brand_id}", get(routes::campaigns::by_brand))
        .route("/campaigns/type/{campaign_type}", get(routes::campaigns::by_type))
        .route("/campaigns/status/{status}", get(routes::campaigns::by_status))
        .route("/campaigns/{id}", get(routes::campaigns::get))
        .route("/campaigns/{id}/schedule", put(routes::campaigns::schedule))
        .route("/campaigns/{id}/activate", put(routes::campaigns::activate))
        .route("/campaigns/{id}/pause", put(routes::campaigns::pause))
        .route("/campaigns/{id}/finalize", put(routes::campaigns::finalize))
        .route("/campaigns/{id}/cancel", put(routes::campaigns::cancel))
        .route("/campaigns/{id}/metrics", put(routes::campaigns::update_metrics))
        .route("/outbox", get(routes::outbox::list))
        .route("/outbox/stats", get(routes::outbox::stats))
        .route("/outbox/requeue", post(routes::outbox::requeue))
        .route(
            "/admin/projection/consistency",
            get(routes::admin::consistency),
        )
        .route("/admin/projection/rebuild", post(routes::admin::rebuild))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
