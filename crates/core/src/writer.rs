use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, ValidationError, WriteError};
use crate::ports::{RecordStore, StoredRecord};
use crate::types::{Notification, NotificationPayload, Priority, Recipient, NOTIFICATION_ENTITY};

/// Persists one notification record per call.
#[derive(Clone)]
pub struct NotificationWriter {
    store: Arc<dyn RecordStore>,
}

impl NotificationWriter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Validates the payload and recipient, then creates exactly one unread record.
    ///
    /// Store failures are returned to the caller; nothing is retried.
    pub async fn write(
        &self,
        payload: &NotificationPayload,
        recipient: &Recipient,
    ) -> Result<Notification, WriteError> {
        payload.validate()?;
        if recipient.id.trim().is_empty() {
            return Err(ValidationError::MissingField("recipient_id").into());
        }
        self.persist(payload, recipient).await
    }

    /// Writes without re-validating. Callers must have validated already.
    pub(crate) async fn persist(
        &self,
        payload: &NotificationPayload,
        recipient: &Recipient,
    ) -> Result<Notification, WriteError> {
        let fields = NotificationFields {
            organization_id: payload.organization_id.clone(),
            recipient_id: recipient.id.clone(),
            recipient_email: recipient.email.clone(),
            kind: payload.kind.clone(),
            title: payload.title.clone(),
            message: payload.message.clone(),
            link: payload.link.clone(),
            priority: payload.priority,
            is_read: false,
        };
        let Value::Object(map) =
            serde_json::to_value(&fields).map_err(|err| StoreError::Rejected(err.to_string()))?
        else {
            return Err(StoreError::Rejected("notification fields are not an object".into()).into());
        };

        // Only the id and timestamp are taken from the stored record.
        let outcome = match self.store.create(NOTIFICATION_ENTITY, map).await {
            Ok(record) => Ok(fields.into_notification(record)),
            Err(err) => Err(WriteError::from(err)),
        };

        let label = if outcome.is_ok() { "ok" } else { "error" };
        counter!("notifications_written_total", "result" => label).increment(1);
        if let Ok(notification) = &outcome {
            debug!(
                stage = "writer",
                notification = %notification.id,
                recipient = %notification.recipient_id,
                kind = %notification.kind,
                "notification persisted"
            );
        }
        outcome
    }
}

/// Field layout of a stored `Notification` entity.
#[derive(Debug, Serialize)]
struct NotificationFields {
    organization_id: String,
    recipient_id: String,
    recipient_email: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    message: String,
    link: Option<String>,
    priority: Priority,
    is_read: bool,
}

impl NotificationFields {
    fn into_notification(self, record: StoredRecord) -> Notification {
        Notification {
            id: record.id,
            organization_id: self.organization_id,
            recipient_id: self.recipient_id,
            recipient_email: self.recipient_email,
            kind: self.kind,
            title: self.title,
            message: self.message,
            link: self.link,
            priority: self.priority,
            is_read: self.is_read,
            created_at: record.created_at,
        }
    }
}
