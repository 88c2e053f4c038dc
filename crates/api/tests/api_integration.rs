//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::Backends;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let backends = Backends::in_memory();
    api::create_app(Arc::new(backends.state()), get_metrics_handle())
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_string(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn create_body() -> Value {
    json!({
        "brand_id": "6c0d5f1e-5b4a-4f0e-9d2a-2f5e8b1c7a10",
        "name": "Summer Sale",
        "campaign_type": "affiliate",
        "objective": "sales",
        "total_budget_cents": 500000,
        "sales_target": 1000
    })
}

async fn create(app: &axum::Router) -> String {
    let (status, json) = send(app, "POST", "/campaigns", Some(create_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    json["campaign_id"].as_str().unwrap().to_string()
}

async fn schedule_and_activate(app: &axum::Router, id: &str) {
    let (status, _) = send(
        app,
        "PUT",
        &format!("/campaigns/{id}/schedule"),
        Some(json!({
            "start_date": "2030-06-01T00:00:00Z",
            "end_date": "2030-06-30T00:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(app, "PUT", &format!("/campaigns/{id}/activate"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_campaign() {
    let app = setup();
    let (status, json) = send(&app, "POST", "/campaigns", Some(create_body())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "DRAFT");
    assert_eq!(json["version"], 1);
    assert_eq!(json["event_type"], "CampaignCreated");
    assert!(json["outbox_id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_campaign_with_unknown_type() {
    let app = setup();
    let mut body = create_body();
    body["campaign_type"] = json!("billboard");

    let (status, json) = send(&app, "POST", "/campaigns", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("billboard"));
}

#[tokio::test]
async fn test_create_campaign_with_empty_name() {
    let app = setup();
    let mut body = create_body();
    body["name"] = json!("  ");

    let (status, _) = send(&app, "POST", "/campaigns", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_with_taken_id_conflicts() {
    let app = setup();
    let id = create(&app).await;
    let mut body = create_body();
    body["campaign_id"] = json!(id);

    let (status, _) = send(&app, "POST", "/campaigns", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_lifecycle_commands() {
    let app = setup();
    let id = create(&app).await;
    schedule_and_activate(&app, &id).await;

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/campaigns/{id}/pause"),
        Some(json!({"reason": "stock outage"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "PAUSED");
    assert_eq!(json["version"], 4);

    let (_, json) = send(&app, "PUT", &format!("/campaigns/{id}/activate"), None).await;
    assert_eq!(json["status"], "ACTIVE");

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/campaigns/{id}/metrics"),
        Some(json!({"sales_delta": 10, "engagement_delta": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["event_type"], "CampaignMetricsUpdated");

    let (_, json) = send(&app, "PUT", &format!("/campaigns/{id}/finalize"), None).await;
    assert_eq!(json["status"], "FINALIZED");
    assert_eq!(json["version"], 7);
}

#[tokio::test]
async fn test_invalid_transition_conflicts() {
    let app = setup();
    let id = create(&app).await;

    let (status, json) = send(&app, "PUT", &format!("/campaigns/{id}/activate"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        json["error"],
        "Campaign error: Invalid state transition: cannot activate a campaign in DRAFT status \
         (requires SCHEDULED or PAUSED)"
    );

    let (_, outbox) = send(&app, "GET", &format!("/outbox?aggregate_id={id}"), None).await;
    assert_eq!(outbox.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_command_on_unknown_campaign() {
    let app = setup();
    let uri = "/campaigns/00000000-0000-0000-0000-0000000000aa/activate";

    let (status, _) = send(&app, "PUT", uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PUT", "/campaigns/not-a-uuid/activate", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_schedule_dates() {
    let app = setup();
    let id = create(&app).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/campaigns/{id}/schedule"),
        Some(json!({
            "start_date": "2030-06-30T00:00:00Z",
            "end_date": "2030-06-01T00:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_outbox_endpoints() {
    let app = setup();
    let id = create(&app).await;
    schedule_and_activate(&app, &id).await;

    let (status, rows) = send(&app, "GET", "/outbox?status=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        vec!["CampaignCreated", "CampaignScheduled", "CampaignActivated"]
    );

    let (_, stats) = send(&app, "GET", "/outbox/stats", None).await;
    assert_eq!(stats, json!({"pending": 3, "published": 0, "failed": 0}));

    let (status, json) = send(&app, "POST", "/outbox/requeue", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["requeued"], 0);

    let (status, _) = send(&app, "GET", "/outbox?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_queries_read_projected_rows() {
    let app = setup();
    let id = create(&app).await;
    schedule_and_activate(&app, &id).await;
    create(&app).await;

    let (status, _) = send(&app, "GET", &format!("/campaigns/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, consistency) = send(&app, "GET", "/admin/projection/consistency", None).await;
    assert_eq!(consistency["missing"].as_array().unwrap().len(), 2);

    let (status, report) = send(&app, "POST", "/admin/projection/rebuild", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["applied"], 4);

    let (status, view) = send(&app, "GET", &format!("/campaigns/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "ACTIVE");
    assert_eq!(view["last_applied_version"], 3);
    assert_eq!(view["total_budget"], 500000);

    let (_, active) = send(&app, "GET", "/campaigns/active", None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);

    let (_, drafts) = send(&app, "GET", "/campaigns/status/draft", None).await;
    assert_eq!(drafts.as_array().unwrap().len(), 1);

    let (_, affiliate) = send(&app, "GET", "/campaigns/type/affiliate", None).await;
    assert_eq!(affiliate.as_array().unwrap().len(), 2);

    let (_, brand) = send(
        &app,
        "GET",
        "/campaigns/brand/6c0d5f1e-5b4a-4f0e-9d2a-2f5e8b1c7a10",
        None,
    )
    .await;
    assert_eq!(brand.as_array().unwrap().len(), 2);

    let (_, filtered) = send(
        &app,
        "GET",
        "/campaigns?starts_from=2030-05-01T00:00:00Z&min_budget=100000",
        None,
    )
    .await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let (_, consistency) = send(&app, "GET", "/admin/projection/consistency", None).await;
    assert!(consistency["missing"].as_array().unwrap().is_empty());
    assert!(consistency["mismatched"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    create(&app).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("campaign_commands_total"));
}
