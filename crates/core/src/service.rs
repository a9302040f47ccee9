use std::sync::Arc;

use crate::dispatch::{DispatchReport, FanOutDispatcher};
use crate::error::{ValidationError, WriteError};
use crate::escalation::{AdminEscalator, PrivilegedDispatch};
use crate::ports::{EmailSender, RecordStore};
use crate::types::{DirectoryEntry, Notification, NotificationPayload, Recipient};
use crate::writer::NotificationWriter;

/// Entry point used by business-event handlers.
#[derive(Clone)]
pub struct NotificationService {
    writer: NotificationWriter,
    dispatcher: FanOutDispatcher,
    escalator: AdminEscalator,
}

impl NotificationService {
    pub fn new(store: Arc<dyn RecordStore>, email: Arc<dyn EmailSender>) -> Self {
        let writer = NotificationWriter::new(store);
        let dispatcher = FanOutDispatcher::new(writer.clone());
        let escalator = AdminEscalator::new(dispatcher.clone(), email);
        Self {
            writer,
            dispatcher,
            escalator,
        }
    }

    /// Creates a single notification for one recipient.
    pub async fn create_notification(
        &self,
        payload: &NotificationPayload,
        recipient: &Recipient,
    ) -> Result<Notification, WriteError> {
        self.writer.write(payload, recipient).await
    }

    /// Sends the same notification to every recipient.
    pub async fn notify_multiple(
        &self,
        payload: &NotificationPayload,
        recipients: Vec<Recipient>,
    ) -> Result<DispatchReport, ValidationError> {
        self.dispatcher.dispatch_many(payload, recipients).await
    }

    /// Notifies the privileged members of `directory`, escalating by email
    /// when `send_email` is set and the priority warrants it.
    pub async fn notify_admins(
        &self,
        payload: &NotificationPayload,
        directory: &[DirectoryEntry],
        send_email: bool,
    ) -> Result<PrivilegedDispatch, ValidationError> {
        self.escalator
            .notify_privileged(payload, directory, send_email)
            .await
    }
}
