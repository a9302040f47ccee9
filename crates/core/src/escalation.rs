use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchReport, FanOutDispatcher};
use crate::error::{SendError, ValidationError};
use crate::ports::{EmailBatch, EmailSender};
use crate::types::{DirectoryEntry, NotificationPayload, Recipient};

/// Privileged recipients resolved from a directory snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegedRecipients {
    /// Every privileged entry, addressed for in-app delivery.
    pub recipients: Vec<Recipient>,
    /// Distinct, non-blank contact addresses of those entries.
    pub addresses: BTreeSet<String>,
}

/// Selects the directory entries holding a privileged role.
///
/// Entries without a contact address stay in `recipients` and are only left
/// out of `addresses`. Entries with a blank identifier cannot be addressed
/// and are skipped.
pub fn resolve_privileged(directory: &[DirectoryEntry]) -> PrivilegedRecipients {
    let mut resolved = PrivilegedRecipients::default();
    for entry in directory {
        if entry.privileged_role().is_none() {
            continue;
        }
        if entry.id.trim().is_empty() {
            warn!(
                stage = "escalation",
                role = entry.role.as_deref().unwrap_or_default(),
                "skipping privileged directory entry without id"
            );
            continue;
        }
        let address = entry.contact_address();
        if let Some(address) = address {
            resolved.addresses.insert(address.to_string());
        }
        resolved.recipients.push(Recipient {
            id: entry.id.clone(),
            email: address.map(str::to_string),
        });
    }
    resolved
}

/// What happened to the optional email escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The caller did not ask for email.
    NotRequested,
    /// Priority is below `high`.
    BelowThreshold,
    /// No privileged entry had a usable address.
    NoAddresses,
    Sent { recipients: usize },
    Failed(SendError),
}

impl EscalationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::BelowThreshold => "below_threshold",
            Self::NoAddresses => "no_addresses",
            Self::Sent { .. } => "sent",
            Self::Failed(_) => "failed",
        }
    }
}

/// In-app dispatch report plus the independent email escalation outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivilegedDispatch {
    pub report: DispatchReport,
    pub escalation: EscalationOutcome,
}

/// Notifies the privileged members of a directory and escalates by email.
#[derive(Clone)]
pub struct AdminEscalator {
    dispatcher: FanOutDispatcher,
    email: Arc<dyn EmailSender>,
}

impl AdminEscalator {
    pub fn new(dispatcher: FanOutDispatcher, email: Arc<dyn EmailSender>) -> Self {
        Self { dispatcher, email }
    }

    /// Fans the payload out to every privileged entry, then sends one batched
    /// email when `escalate_by_email` is set and the priority is high or urgent.
    ///
    /// The email step runs whatever the in-app outcome was, and its failure is
    /// logged and recorded in the escalation outcome only.
    pub async fn notify_privileged(
        &self,
        payload: &NotificationPayload,
        directory: &[DirectoryEntry],
        escalate_by_email: bool,
    ) -> Result<PrivilegedDispatch, ValidationError> {
        payload.validate()?;
        let PrivilegedRecipients {
            recipients,
            addresses,
        } = resolve_privileged(directory);
        debug!(
            stage = "escalation",
            organization = %payload.organization_id,
            directory = directory.len(),
            privileged = recipients.len(),
            addresses = addresses.len(),
            "resolved privileged recipients"
        );

        let report = self.dispatcher.dispatch_many(payload, recipients).await?;

        let escalation = if !escalate_by_email {
            EscalationOutcome::NotRequested
        } else if !payload.priority.escalates() {
            EscalationOutcome::BelowThreshold
        } else if addresses.is_empty() {
            EscalationOutcome::NoAddresses
        } else {
            self.escalate(payload, addresses).await
        };

        Ok(PrivilegedDispatch { report, escalation })
    }

    async fn escalate(
        &self,
        payload: &NotificationPayload,
        addresses: BTreeSet<String>,
    ) -> EscalationOutcome {
        let batch = EmailBatch {
            addresses,
            title: payload.title.clone(),
            message: payload.message.clone(),
            priority: payload.priority,
        };
        let outcome = match self.email.send_batch(&batch).await {
            Ok(()) => {
                info!(
                    stage = "escalation",
                    organization = %payload.organization_id,
                    recipients = batch.addresses.len(),
                    priority = %payload.priority,
                    "escalation email sent"
                );
                EscalationOutcome::Sent {
                    recipients: batch.addresses.len(),
                }
            }
            Err(err) => {
                error!(
                    stage = "escalation",
                    organization = %payload.organization_id,
                    recipients = batch.addresses.len(),
                    error = %err,
                    "escalation email failed"
                );
                EscalationOutcome::Failed(err)
            }
        };
        counter!("notification_escalations_total", "result" => outcome.as_str()).increment(1);
        outcome
    }
}
