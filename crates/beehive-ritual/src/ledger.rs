//! Ritual ledger: append-only record of invocation transitions.
//!
//! Entries are owned by the ledger; every read returns a clone, so callers
//! can never reach ledger state through a returned value.
//!
//! A second terminal transition (`fail` after `complete` or the reverse) is
//! rejected with [`LedgerError::InvalidTransition`]. A retry must start a new
//! invocation instead of rewriting the outcome of a finished one.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::invocation::{InvocationRecord, InvocationStatus, Metadata};

pub const DEFAULT_LEDGER_CAPACITY: usize = 500;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown invocation: {0}")]
    UnknownInvocation(String),

    #[error("invocation already recorded: {0}")]
    DuplicateInvocation(String),

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: InvocationStatus,
        to: InvocationStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub id: String,
    pub invocation_id: String,
    pub ritual: String,
    pub status: InvocationStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub invocation: InvocationRecord,
    pub events: Vec<LedgerEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// In-memory ledger of ritual invocations.
pub struct RitualLedger {
    entries: RwLock<VecDeque<LedgerEntry>>,
    capacity: usize,
}

impl RitualLedger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }

    /// Ledger that retains at most `capacity` entries, evicting finished ones first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record a pending invocation as running.
    pub fn start(
        &self,
        invocation: InvocationRecord,
        metadata: Option<Metadata>,
        note: Option<&str>,
    ) -> Result<LedgerEntry, LedgerError> {
        let started = invocation
            .advance(InvocationStatus::Running, note, metadata.as_ref())
            .ok_or_else(|| LedgerError::InvalidTransition {
                id: invocation.id.clone(),
                from: invocation.status,
                to: InvocationStatus::Running,
            })?;

        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.invocation.id == started.id) {
            return Err(LedgerError::DuplicateInvocation(started.id));
        }

        let event = new_event(&started, InvocationStatus::Running, note, metadata.as_ref());
        let entry = LedgerEntry {
            invocation: started,
            events: vec![event],
            summary: note.map(String::from),
        };
        entries.push_back(entry.clone());
        evict_over_capacity(&mut entries, self.capacity);
        debug!("Ledger start: {} ({})", entry.invocation.id, entry.invocation.ritual);
        Ok(entry)
    }

    /// Append an event without changing status. `None` for an unknown id.
    pub fn annotate(
        &self,
        invocation_id: &str,
        note: &str,
        metadata: Option<Metadata>,
    ) -> Option<LedgerEntry> {
        let mut entries = self.entries.write();
        let entry = entries.iter_mut().find(|e| e.invocation.id == invocation_id)?;

        let invocation = entry.invocation.annotate(Some(note), metadata.as_ref());
        let event = new_event(&invocation, invocation.status, Some(note), metadata.as_ref());
        entry.invocation = invocation;
        entry.events.push(event);
        Some(entry.clone())
    }

    pub fn complete(
        &self,
        invocation_id: &str,
        metadata: Option<Metadata>,
        note: Option<&str>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.record_status(invocation_id, InvocationStatus::Completed, note, metadata)
    }

    pub fn fail(
        &self,
        invocation_id: &str,
        metadata: Option<Metadata>,
        note: Option<&str>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.record_status(invocation_id, InvocationStatus::Failed, note, metadata)
    }

    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn get(&self, invocation_id: &str) -> Option<LedgerEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.invocation.id == invocation_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn record_status(
        &self,
        invocation_id: &str,
        status: InvocationStatus,
        note: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.invocation.id == invocation_id)
            .ok_or_else(|| LedgerError::UnknownInvocation(invocation_id.to_string()))?;

        let invocation = entry
            .invocation
            .advance(status, note, metadata.as_ref())
            .ok_or_else(|| LedgerError::InvalidTransition {
                id: invocation_id.to_string(),
                from: entry.invocation.status,
                to: status,
            })?;

        let event = new_event(&invocation, status, note, metadata.as_ref());
        entry.invocation = invocation;
        entry.events.push(event);
        if status == InvocationStatus::Completed {
            if let Some(note) = note {
                entry.summary = Some(note.to_string());
            }
        }
        Ok(entry.clone())
    }
}

impl Default for RitualLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn new_event(
    invocation: &InvocationRecord,
    status: InvocationStatus,
    note: Option<&str>,
    metadata: Option<&Metadata>,
) -> LedgerEvent {
    LedgerEvent {
        id: format!("event-{}", uuid::Uuid::new_v4()),
        invocation_id: invocation.id.clone(),
        ritual: invocation.ritual.clone(),
        status,
        timestamp: Utc::now(),
        note: note.map(String::from),
        metadata: metadata.cloned(),
    }
}

fn evict_over_capacity(entries: &mut VecDeque<LedgerEntry>, capacity: usize) {
    while entries.len() > capacity {
        match entries.iter().position(|e| e.invocation.status.is_terminal()) {
            Some(index) => {
                entries.remove(index);
            }
            None => {
                entries.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn started(ledger: &RitualLedger, ritual: &str) -> String {
        let record = InvocationRecord::new(ritual, Some(json!({"pr": 42})), None);
        ledger.start(record, None, Some("begin")).unwrap().invocation.id
    }

    #[test]
    fn test_start_records_running_event() {
        let ledger = RitualLedger::new();
        let record = InvocationRecord::new("risk-score", None, None);
        let metadata = meta(json!({"jobId": "j1"}));
        let entry = ledger.start(record, Some(metadata), Some("begin")).unwrap();
        assert_eq!(entry.invocation.status, InvocationStatus::Running);
        assert_eq!(entry.events.len(), 1);
        assert_eq!(entry.events[0].status, InvocationStatus::Running);
        assert_eq!(entry.summary.as_deref(), Some("begin"));
        assert_eq!(entry.invocation.metadata["jobId"], "j1");
    }

    #[test]
    fn test_annotate_unknown_id_returns_none() {
        let ledger = RitualLedger::new();
        assert!(ledger.annotate("invocation-missing", "hello", None).is_none());
    }

    #[test]
    fn test_annotate_merges_metadata_additively() {
        let ledger = RitualLedger::new();
        let id = started(&ledger, "label-pr");
        ledger.annotate(&id, "first", Some(meta(json!({"a": 1}))));
        let entry = ledger.annotate(&id, "second", Some(meta(json!({"b": 2})))).unwrap();

        assert_eq!(entry.invocation.metadata["a"], 1);
        assert_eq!(entry.invocation.metadata["b"], 2);
        assert_eq!(entry.invocation.status, InvocationStatus::Running);
        assert_eq!(entry.events.len(), 3);
        assert_eq!(entry.invocation.notes, vec!["begin", "first", "second"]);
    }

    #[test]
    fn test_complete_then_fail_is_rejected() {
        let ledger = RitualLedger::new();
        let id = started(&ledger, "pr-gate");
        let done = ledger.complete(&id, None, Some("sealed")).unwrap();
        assert_eq!(done.invocation.status, InvocationStatus::Completed);
        assert_eq!(done.summary.as_deref(), Some("sealed"));

        let err = ledger.fail(&id, None, Some("late failure")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidTransition {
                id: id.clone(),
                from: InvocationStatus::Completed,
                to: InvocationStatus::Failed,
            }
        );
        let entry = ledger.get(&id).unwrap();
        assert_eq!(entry.invocation.status, InvocationStatus::Completed);
        assert_eq!(entry.events.len(), 2);
    }

    #[test]
    fn test_status_never_returns_to_pending() {
        let ledger = RitualLedger::new();
        let id = started(&ledger, "coherence-check");
        ledger.fail(&id, None, Some("boom")).unwrap();
        let entry = ledger.get(&id).unwrap();
        let statuses: Vec<_> = entry.events.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![InvocationStatus::Running, InvocationStatus::Failed]);
        assert!(!statuses.contains(&InvocationStatus::Pending));
    }

    #[test]
    fn test_start_requires_pending_record() {
        let ledger = RitualLedger::new();
        let record = InvocationRecord::new("ping", None, None);
        let running = record.advance(InvocationStatus::Running, None, None).unwrap();
        assert!(matches!(
            ledger.start(running, None, None),
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_unknown_complete_is_error() {
        let ledger = RitualLedger::new();
        assert_eq!(
            ledger.complete("nope", None, None).unwrap_err(),
            LedgerError::UnknownInvocation("nope".into())
        );
    }

    #[test]
    fn test_snapshot_is_detached() {
        let ledger = RitualLedger::new();
        let id = started(&ledger, "predict-todos");
        let mut snapshot = ledger.snapshot();
        snapshot[0].invocation.notes.push("tampered".into());
        snapshot[0].events.clear();

        let entry = ledger.get(&id).unwrap();
        assert_eq!(entry.invocation.notes, vec!["begin"]);
        assert_eq!(entry.events.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_finished_entries_first() {
        let ledger = RitualLedger::with_capacity(2);
        let first = started(&ledger, "a");
        let second = started(&ledger, "b");
        ledger.complete(&second, None, None).unwrap();
        let third = started(&ledger, "c");

        assert_eq!(ledger.len(), 2);
        assert!(ledger.get(&first).is_some());
        assert!(ledger.get(&second).is_none());
        assert!(ledger.get(&third).is_some());
    }
}
