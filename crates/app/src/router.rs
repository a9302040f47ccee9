use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use bizops_notify_core::{EmailSender, NotificationService};
use bizops_notify_storage::Database;

use crate::{ingest, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    notifications: NotificationService,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, email: Arc<dyn EmailSender>) -> Self {
        let notifications = NotificationService::new(Arc::new(storage.records()), email);
        Self {
            metrics,
            storage,
            notifications,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/events", post(ingest::handle))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use bizops_notify_core::{DirectoryEntry, NOTIFICATION_ENTITY};
    use bizops_notify_mailer::{DisabledMailer, HttpMailer};
    use http_body_util::BodyExt;
    use httpmock::prelude::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        state: AppState,
        _dir: TempDir,
    }

    async fn setup(email: Arc<dyn EmailSender>) -> Harness {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");

        let directory = database.directory();
        for entry in [
            DirectoryEntry::new("u-owner")
                .with_role("super_admin")
                .with_email("owner@acme.test"),
            DirectoryEntry::new("u-stock")
                .with_role("warehouse_manager")
                .with_email("stock@acme.test")
                .with_user_email("stock.lead@acme.test"),
            DirectoryEntry::new("u-clerk")
                .with_role("cashier")
                .with_email("clerk@acme.test"),
        ] {
            directory.upsert("org-1", &entry).await.expect("seed");
        }

        Harness {
            state: AppState::new(metrics, database, email),
            _dir: dir,
        }
    }

    fn post_event(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/events")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        serde_json::from_slice(&collected.to_bytes()).expect("json body")
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let harness = setup(Arc::new(DisabledMailer)).await;

        let response = app_router(harness.state)
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let harness = setup(Arc::new(DisabledMailer)).await;

        let response = app_router(harness.state)
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn event_notifies_privileged_members_only() {
        let harness = setup(Arc::new(DisabledMailer)).await;
        let storage = harness.state.storage().clone();

        let response = app_router(harness.state.clone())
            .oneshot(post_event(json!({
                "organization_id": "org-1",
                "event": {
                    "kind": "leave_requested",
                    "employee_name": "Ama",
                    "leave_id": "lv-9",
                    "days": 3
                }
            })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["delivered"], 2);
        assert_eq!(body["failed"], 0);
        assert_eq!(body["escalation"], "not_requested");
        let ids: Vec<&str> = body["outcomes"]
            .as_array()
            .expect("outcomes")
            .iter()
            .map(|outcome| outcome["recipient_id"].as_str().expect("id"))
            .collect();
        assert_eq!(ids, vec!["u-owner", "u-stock"]);

        let records = storage
            .records()
            .list(NOTIFICATION_ENTITY, Some("org-1"))
            .await
            .expect("list");
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|record| record.fields["type"] == "leave_request"));
    }

    #[tokio::test]
    async fn urgent_event_escalates_by_email() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/functions/send-email").json_body(json!({
                    "from": "notifications@acme.test",
                    "to": ["owner@acme.test", "stock.lead@acme.test"],
                    "subject": "Out of stock",
                    "message": "Sugar 1kg (SUG-1) is out of stock",
                    "priority": "urgent"
                }));
                then.status(200);
            })
            .await;
        let base = url::Url::parse(&server.url("/functions/")).expect("url");
        let mailer = HttpMailer::new(base, "notifications@acme.test", reqwest::Client::new());
        let harness = setup(Arc::new(mailer)).await;

        let response = app_router(harness.state)
            .oneshot(post_event(json!({
                "organization_id": "org-1",
                "send_email": true,
                "event": {
                    "kind": "stock_low",
                    "product_name": "Sugar 1kg",
                    "sku": "SUG-1",
                    "quantity": 0,
                    "reorder_level": 20
                }
            })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["delivered"], 2);
        assert_eq!(body["escalation"], "sent");
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn mail_failure_is_reported_without_failing_request() {
        let harness = setup(Arc::new(DisabledMailer)).await;

        let response = app_router(harness.state)
            .oneshot(post_event(json!({
                "organization_id": "org-1",
                "send_email": true,
                "event": {
                    "kind": "delivery_delayed",
                    "trip_id": "trip-4",
                    "vehicle": "GR-1234-24",
                    "delay_minutes": 95
                }
            })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["delivered"], 2);
        assert_eq!(body["escalation"], "failed");
        assert!(body["escalation_error"].is_string());
    }

    #[tokio::test]
    async fn blank_organization_is_unprocessable() {
        let harness = setup(Arc::new(DisabledMailer)).await;
        let storage = harness.state.storage().clone();

        let response = app_router(harness.state)
            .oneshot(post_event(json!({
                "organization_id": "  ",
                "event": {
                    "kind": "sale_recorded",
                    "invoice_number": "INV-1",
                    "total": 12.5,
                    "currency": "GHS"
                }
            })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
        let body = read_json(response).await;
        assert_eq!(body["type"], "invalid_notification");
        assert_eq!(
            storage
                .records()
                .count(NOTIFICATION_ENTITY)
                .await
                .expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let harness = setup(Arc::new(DisabledMailer)).await;

        let response = app_router(harness.state)
            .oneshot(post_event(json!({ "organization_id": "org-1" })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["type"], "invalid_body");
    }

    #[tokio::test]
    async fn priority_override_raises_leave_request_to_escalation() {
        let harness = setup(Arc::new(DisabledMailer)).await;

        let response = app_router(harness.state)
            .oneshot(post_event(json!({
                "organization_id": "org-1",
                "send_email": true,
                "priority": "urgent",
                "event": {
                    "kind": "leave_requested",
                    "employee_name": "Ama",
                    "leave_id": "lv-10",
                    "days": 12
                }
            })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["delivered"], 2);
        // Without the override a leave request stays below the email threshold.
        assert_eq!(body["escalation"], "failed");
    }

    #[tokio::test]
    async fn unknown_priority_override_is_unprocessable() {
        let harness = setup(Arc::new(DisabledMailer)).await;
        let storage = harness.state.storage().clone();

        let response = app_router(harness.state)
            .oneshot(post_event(json!({
                "organization_id": "org-1",
                "priority": "critical",
                "event": {
                    "kind": "leave_requested",
                    "employee_name": "Ama",
                    "leave_id": "lv-11",
                    "days": 1
                }
            })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = read_json(response).await;
        assert_eq!(body["type"], "invalid_notification");
        assert_eq!(body["detail"], "unknown priority 'critical'");
        assert_eq!(
            storage
                .records()
                .count(NOTIFICATION_ENTITY)
                .await
                .expect("count"),
            0
        );
    }
}
