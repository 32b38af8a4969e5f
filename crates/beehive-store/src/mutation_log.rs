//! Bounded append-only mutation history plus a "current" pointer.
//!
//! `append` never propagates a persistence failure: the log is observability,
//! not a correctness dependency of the caller's outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blob::{read_json, write_json, BlobStore, CURRENT_KEY, HISTORY_KEY};
use beehive_core::{Overlay, Result};

pub const MUTATION_NAMESPACE: &str = "mutations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    #[serde(alias = "success")]
    Ok,
    #[serde(alias = "failure", alias = "error")]
    Fail,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fail => "fail",
        }
    }
}

/// One row of the audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub ritual: String,
    pub status: MutationStatus,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
}

impl MutationRecord {
    pub fn new(
        status: MutationStatus,
        actor: impl Into<String>,
        ritual: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            ritual: ritual.into(),
            status,
            message: message.into(),
            metadata: serde_json::Value::Object(Default::default()),
            overlay: None,
        }
    }

    pub fn ok(
        actor: impl Into<String>,
        ritual: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(MutationStatus::Ok, actor, ritual, message)
    }

    pub fn fail(
        actor: impl Into<String>,
        ritual: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(MutationStatus::Fail, actor, ritual, message)
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = Some(overlay);
        self
    }
}

/// The single "current status" document read by badges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPointer {
    pub status: MutationStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub ritual: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
}

impl From<&MutationRecord> for CurrentPointer {
    fn from(record: &MutationRecord) -> Self {
        Self {
            status: record.status,
            timestamp: record.timestamp,
            actor: record.actor.clone(),
            ritual: record.ritual.clone(),
            message: if record.message.is_empty() {
                None
            } else {
                Some(record.message.clone())
            },
            overlay: record.overlay.clone(),
        }
    }
}

pub struct MutationLog {
    store: Arc<dyn BlobStore>,
    max_records: usize,
    /// Serializes read-modify-write of the history list within this process.
    write_lock: Mutex<()>,
}

impl MutationLog {
    pub fn new(store: Arc<dyn BlobStore>, max_records: usize) -> Self {
        Self {
            store,
            max_records: max_records.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Append and report persistence failures to the caller.
    pub fn try_append(&self, record: &MutationRecord) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut history: Vec<MutationRecord> =
            read_json(self.store.as_ref(), MUTATION_NAMESPACE, HISTORY_KEY)?.unwrap_or_default();
        history.push(record.clone());
        if history.len() > self.max_records {
            let excess = history.len() - self.max_records;
            history.drain(..excess);
        }

        write_json(self.store.as_ref(), MUTATION_NAMESPACE, HISTORY_KEY, &history)?;
        write_json(
            self.store.as_ref(),
            MUTATION_NAMESPACE,
            CURRENT_KEY,
            &CurrentPointer::from(record),
        )?;
        debug!(
            "Mutation logged: ritual={} status={} ({} records)",
            record.ritual,
            record.status.as_str(),
            history.len()
        );
        Ok(())
    }

    /// Append, logging and swallowing any persistence failure. Returns whether the write landed.
    pub fn append(&self, record: MutationRecord) -> bool {
        match self.try_append(&record) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Mutation log write failed for ritual '{}' ({}): {}",
                    record.ritual,
                    record.status.as_str(),
                    e
                );
                false
            }
        }
    }

    /// Most recent records, oldest first, at most `limit`.
    pub fn recent(&self, limit: usize) -> Vec<MutationRecord> {
        let history: Vec<MutationRecord> =
            match read_json(self.store.as_ref(), MUTATION_NAMESPACE, HISTORY_KEY) {
                Ok(h) => h.unwrap_or_default(),
                Err(e) => {
                    warn!("Failed to read mutation history: {}", e);
                    return Vec::new();
                }
            };
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    pub fn current(&self) -> Option<CurrentPointer> {
        match read_json(self.store.as_ref(), MUTATION_NAMESPACE, CURRENT_KEY) {
            Ok(current) => current,
            Err(e) => {
                warn!("Failed to read mutation pointer: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use beehive_core::Error;

    struct FailingStore;

    impl BlobStore for FailingStore {
        fn get(&self, _namespace: &str, _key: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }

        fn set(&self, _namespace: &str, _key: &str, _value: &serde_json::Value) -> Result<()> {
            Err(Error::Persistence("disk full".into()))
        }
    }

    fn memory_log(max: usize) -> MutationLog {
        MutationLog::new(Arc::new(MemoryBlobStore::new()), max)
    }

    #[test]
    fn test_append_updates_history_and_current() {
        let log = memory_log(10);
        assert!(log.append(MutationRecord::ok("ada", "orchestrator", "done")));

        let recent = log.recent(10);
        assert_eq!(recent.len(), 1);
        let current = log.current().unwrap();
        assert_eq!(current.status, MutationStatus::Ok);
        assert_eq!(current.ritual, "orchestrator");
        assert_eq!(current.message.as_deref(), Some("done"));
    }

    #[test]
    fn test_bounded_history_drops_oldest() {
        let log = memory_log(1000);
        for i in 0..1001 {
            log.append(MutationRecord::ok("bot", "ping", format!("record {}", i)));
        }
        let recent = log.recent(usize::MAX);
        assert_eq!(recent.len(), 1000);
        assert_eq!(recent[0].message, "record 1");
        assert_eq!(recent[999].message, "record 1000");
    }

    #[test]
    fn test_current_tracks_latest_write() {
        let log = memory_log(5);
        log.append(MutationRecord::ok("a", "orchestrator", "first"));
        log.append(MutationRecord::fail("b", "broadcast", "second"));
        let current = log.current().unwrap();
        assert_eq!(current.status, MutationStatus::Fail);
        assert_eq!(current.actor, "b");
    }

    #[test]
    fn test_recent_returns_tail_slice() {
        let log = memory_log(50);
        for i in 0..20 {
            log.append(MutationRecord::ok("bot", "ping", i.to_string()));
        }
        let recent = log.recent(3);
        let messages: Vec<_> = recent.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["17", "18", "19"]);
    }

    #[test]
    fn test_persistence_failure_is_swallowed() {
        let log = MutationLog::new(Arc::new(FailingStore), 10);
        assert!(!log.append(MutationRecord::ok("a", "orchestrator", "x")));
        assert!(log.try_append(&MutationRecord::ok("a", "orchestrator", "x")).is_err());
        assert!(log.current().is_none());
    }

    #[test]
    fn test_status_accepts_legacy_aliases() {
        let status: MutationStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(status, MutationStatus::Ok);
        let status: MutationStatus = serde_json::from_str("\"failure\"").unwrap();
        assert_eq!(status, MutationStatus::Fail);
    }
}
