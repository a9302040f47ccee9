use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{DirectoryError, SendError, StoreError};
use crate::types::{DirectoryEntry, Priority};

/// Record returned by the entity store after a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub entity_type: String,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Generic append-only entity store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates one new record of `entity_type` holding `fields`.
    async fn create(
        &self,
        entity_type: &str,
        fields: Map<String, Value>,
    ) -> Result<StoredRecord, StoreError>;
}

/// One batched outbound email carrying the same content to every address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailBatch {
    pub addresses: BTreeSet<String>,
    pub title: String,
    pub message: String,
    pub priority: Priority,
}

/// Outbound email collaborator.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_batch(&self, batch: &EmailBatch) -> Result<(), SendError>;
}

/// Read-only source of organisation directory entries.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn entries(&self, organization_id: &str) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}
