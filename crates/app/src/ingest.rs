use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bizops_notify_core::{
    BusinessEvent, DirectoryProvider, EscalationOutcome, NotificationPayload, Priority,
    PrivilegedDispatch, RecipientOutcome, ValidationError,
};

use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub organization_id: String,
    pub event: BusinessEvent,
    #[serde(default)]
    pub send_email: bool,
    /// Replaces the priority derived from the event, e.g. `"urgent"`.
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    delivered: usize,
    failed: usize,
    outcomes: Vec<OutcomeBody>,
    escalation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutcomeBody {
    recipient_id: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&RecipientOutcome> for OutcomeBody {
    fn from(outcome: &RecipientOutcome) -> Self {
        let (status, notification_id, error) = match &outcome.result {
            Ok(notification) => ("delivered", Some(notification.id.clone()), None),
            Err(err) => ("failed", None, Some(err.to_string())),
        };
        Self {
            recipient_id: outcome.recipient.id.clone(),
            status,
            notification_id,
            error,
        }
    }
}

impl From<PrivilegedDispatch> for EventResponse {
    fn from(dispatch: PrivilegedDispatch) -> Self {
        let escalation_error = match &dispatch.escalation {
            EscalationOutcome::Failed(err) => Some(err.to_string()),
            _ => None,
        };
        Self {
            delivered: dispatch.report.delivered_count(),
            failed: dispatch.report.failed_count(),
            outcomes: dispatch.report.outcomes().iter().map(OutcomeBody::from).collect(),
            escalation: dispatch.escalation.as_str(),
            escalation_error,
        }
    }
}

fn event_payload(request: &EventRequest) -> Result<NotificationPayload, ValidationError> {
    let mut payload = request.event.to_payload(&request.organization_id);
    if let Some(raw) = request.priority.as_deref() {
        payload.priority = raw.trim().parse::<Priority>()?;
    }
    payload.validate()?;
    Ok(payload)
}

/// Turns one business event into notifications for the organisation's
/// privileged members.
pub async fn handle(
    State(state): State<AppState>,
    body: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Json<EventResponse>, ProblemResponse> {
    let Json(request) = body.map_err(|rejection| {
        ProblemResponse::bad_request("invalid_body", rejection.body_text())
    })?;

    let event_type = request.event.notification_type();
    let payload = event_payload(&request).map_err(|err| {
        warn!(stage = "ingress", %event_type, error = %err, "rejecting event");
        ProblemResponse::unprocessable("invalid_notification", err.to_string())
    })?;
    counter!("events_ingested_total", "type" => event_type).increment(1);

    let directory = state
        .storage()
        .directory()
        .entries(&payload.organization_id)
        .await
        .map_err(|err| {
            warn!(
                stage = "ingress",
                organization_id = %payload.organization_id,
                error = %err,
                "directory unavailable"
            );
            ProblemResponse::unavailable("directory_unavailable", err.to_string())
        })?;

    let dispatch = state
        .notifications()
        .notify_admins(&payload, &directory, request.send_email)
        .await
        .map_err(|err| ProblemResponse::unprocessable("invalid_notification", err.to_string()))?;

    info!(
        stage = "ingress",
        organization_id = %payload.organization_id,
        %event_type,
        delivered = dispatch.report.delivered_count(),
        failed = dispatch.report.failed_count(),
        escalation = dispatch.escalation.as_str(),
        "event handled"
    );
    Ok(Json(EventResponse::from(dispatch)))
}
