//! Notification dispatch for business events: single writes, concurrent
//! fan-out and privileged-role escalation with a batched email.

pub mod dispatch;
pub mod error;
pub mod escalation;
pub mod events;
pub mod ports;
pub mod service;
pub mod types;
pub mod writer;

#[cfg(test)]
mod testing;

pub use dispatch::{DispatchReport, FanOutDispatcher, RecipientOutcome};
pub use error::{DirectoryError, SendError, StoreError, ValidationError, WriteError};
pub use escalation::{
    resolve_privileged, AdminEscalator, EscalationOutcome, PrivilegedDispatch,
    PrivilegedRecipients,
};
pub use events::BusinessEvent;
pub use ports::{DirectoryProvider, EmailBatch, EmailSender, RecordStore, StoredRecord};
pub use service::NotificationService;
pub use types::{
    DirectoryEntry, Notification, NotificationPayload, Priority, PrivilegedRole, Recipient,
    NOTIFICATION_ENTITY,
};
pub use writer::NotificationWriter;
