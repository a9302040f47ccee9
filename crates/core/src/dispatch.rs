use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{ValidationError, WriteError};
use crate::types::{Notification, NotificationPayload, Recipient};
use crate::writer::NotificationWriter;

/// Result of one recipient's write.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientOutcome {
    pub recipient: Recipient,
    pub result: Result<Notification, WriteError>,
}

impl RecipientOutcome {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-recipient outcomes of a fan-out, in the order recipients were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    outcomes: Vec<RecipientOutcome>,
}

impl DispatchReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> &[RecipientOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.len() - self.delivered_count()
    }

    /// Returns `true` when every recipient received its notification.
    pub fn all_delivered(&self) -> bool {
        self.failed_count() == 0
    }

    /// Iterates over the recipients whose write failed, with the error.
    pub fn failures(&self) -> impl Iterator<Item = (&Recipient, &WriteError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|err| (&o.recipient, err)))
    }
}

/// Delivers one payload to many recipients with independent concurrent writes.
#[derive(Clone)]
pub struct FanOutDispatcher {
    writer: NotificationWriter,
}

impl FanOutDispatcher {
    pub fn new(writer: NotificationWriter) -> Self {
        Self { writer }
    }

    /// Spawns one write per recipient and waits for all of them to settle.
    ///
    /// Duplicated recipients each get their own record. A failing write is
    /// captured in the report and never cancels the other writes. Only a
    /// malformed payload or recipient list fails the call, and it does so
    /// before anything is written.
    pub async fn dispatch_many(
        &self,
        payload: &NotificationPayload,
        recipients: Vec<Recipient>,
    ) -> Result<DispatchReport, ValidationError> {
        payload.validate()?;
        if let Some(index) = recipients.iter().position(|r| r.id.trim().is_empty()) {
            return Err(ValidationError::MissingRecipient { index });
        }
        if recipients.is_empty() {
            return Ok(DispatchReport::empty());
        }

        counter!("notification_dispatch_total").increment(1);
        let shared = Arc::new(payload.clone());
        let mut tasks = JoinSet::new();
        for (index, recipient) in recipients.iter().enumerate() {
            let writer = self.writer.clone();
            let payload = shared.clone();
            let recipient = recipient.clone();
            tasks.spawn(async move { (index, writer.persist(&payload, &recipient).await) });
        }

        let mut slots: Vec<Option<Result<Notification, WriteError>>> =
            (0..recipients.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => {
                    warn!(stage = "dispatch", error = %err, "notification write task did not finish");
                }
            }
        }

        let outcomes: Vec<RecipientOutcome> = recipients
            .into_iter()
            .zip(slots)
            .map(|(recipient, slot)| RecipientOutcome {
                recipient,
                result: slot.unwrap_or_else(|| {
                    Err(WriteError::Aborted("write task panicked or was cancelled".into()))
                }),
            })
            .collect();
        let report = DispatchReport { outcomes };

        for (recipient, err) in report.failures() {
            warn!(
                stage = "dispatch",
                organization = %payload.organization_id,
                recipient = %recipient.id,
                error = %err,
                "notification write failed"
            );
        }
        info!(
            stage = "dispatch",
            organization = %payload.organization_id,
            kind = %payload.kind,
            recipients = report.len(),
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            "notification dispatch settled"
        );
        Ok(report)
    }
}
