//! Audit notes written on every workflow transition.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use stockroom_core::AggregateId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditNote {
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
    pub reference: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Fire-and-forget receiver of audit notes.
pub trait AuditSink: Send + Sync {
    fn note(&self, note: AuditNote);
}

/// Emits notes as `info!` events on target `stockroom::audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn note(&self, note: AuditNote) {
        tracing::info!(
            target: "stockroom::audit",
            aggregate_type = %note.aggregate_type,
            aggregate_id = %note.aggregate_id,
            reference = %note.reference,
            occurred_at = %note.occurred_at,
            "{}",
            note.message
        );
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    notes: Mutex<Vec<AuditNote>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes(&self) -> Vec<AuditNote> {
        match self.notes.lock() {
            Ok(notes) => notes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn messages_for(&self, aggregate_id: AggregateId) -> Vec<String> {
        self.notes()
            .into_iter()
            .filter(|n| n.aggregate_id == aggregate_id)
            .map(|n| n.message)
            .collect()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn note(&self, note: AuditNote) {
        match self.notes.lock() {
            Ok(mut notes) => notes.push(note),
            Err(poisoned) => poisoned.into_inner().push(note),
        }
    }
}
