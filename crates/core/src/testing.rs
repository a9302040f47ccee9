//! In-memory collaborators used by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{SendError, StoreError};
use crate::ports::{EmailBatch, EmailSender, RecordStore, StoredRecord};

pub(crate) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Record store keeping everything in a vector. Ids are derived from the
/// recipient so two stores fed the same writes produce equal records.
#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<Vec<StoredRecord>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    bare_records: bool,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_for(mut self, recipient_id: &str) -> Self {
        self.failing.insert(recipient_id.to_string());
        self
    }

    /// Panics inside `create` for `recipient_id`, as a crashing driver would.
    pub(crate) fn panicking_for(mut self, recipient_id: &str) -> Self {
        self.panicking.insert(recipient_id.to_string());
        self
    }

    /// Returns records with an empty field map while keeping the full copy.
    pub(crate) fn returning_bare_records(mut self) -> Self {
        self.bare_records = true;
        self
    }

    pub(crate) fn delayed_for(mut self, recipient_id: &str, delay: Duration) -> Self {
        self.delays.insert(recipient_id.to_string(), delay);
        self
    }

    pub(crate) fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().expect("records lock").clone()
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(
        &self,
        entity_type: &str,
        fields: Map<String, Value>,
    ) -> Result<StoredRecord, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let recipient = fields
            .get("recipient_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(delay) = self.delays.get(&recipient) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&recipient) {
            panic!("record store crashed while writing for {recipient}");
        }
        if self.failing.contains(&recipient) {
            return Err(StoreError::Unavailable(format!("write refused for {recipient}")));
        }

        let mut records = self.records.lock().expect("records lock");
        let seq = records
            .iter()
            .filter(|record| record.fields.get("recipient_id") == fields.get("recipient_id"))
            .count();
        let record = StoredRecord {
            id: format!("ntf-{recipient}-{seq}"),
            entity_type: entity_type.to_string(),
            fields,
            created_at: fixed_time(),
        };
        records.push(record.clone());
        if self.bare_records {
            return Ok(StoredRecord {
                fields: Map::new(),
                ..record
            });
        }
        Ok(record)
    }
}

/// Email sender that records every batch and optionally fails.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    batches: Mutex<Vec<EmailBatch>>,
    failure: Option<SendError>,
}

impl RecordingMailer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(failure: SendError) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            failure: Some(failure),
        }
    }

    pub(crate) fn batches(&self) -> Vec<EmailBatch> {
        self.batches.lock().expect("batches lock").clone()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send_batch(&self, batch: &EmailBatch) -> Result<(), SendError> {
        self.batches.lock().expect("batches lock").push(batch.clone());
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
