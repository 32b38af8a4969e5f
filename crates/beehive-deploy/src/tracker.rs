//! Deploy status tracker: "current" snapshot plus a bounded per-job history.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use beehive_core::Result;
use beehive_store::{read_json, write_json, BlobStore, CURRENT_KEY, HISTORY_KEY};

use crate::status::{DeployEcho, DeploySnapshot};

pub const DEPLOY_NAMESPACE: &str = "deploy";

pub struct DeployTracker {
    store: Arc<dyn BlobStore>,
    max_entries: usize,
    max_age: Duration,
    write_lock: Mutex<()>,
}

impl DeployTracker {
    pub fn new(store: Arc<dyn BlobStore>, max_entries: usize, max_age_days: i64) -> Self {
        Self {
            store,
            max_entries: max_entries.max(1),
            max_age: Duration::try_days(max_age_days.max(0)).unwrap_or(Duration::MAX),
            write_lock: Mutex::new(()),
        }
    }

    /// Normalize and persist one status echo.
    ///
    /// Replaces any earlier history row for the same job, prunes by age then
    /// count (oldest first), writes history, then overwrites `current`.
    pub fn echo_status(&self, echo: DeployEcho) -> Result<DeploySnapshot> {
        let _guard = self.write_lock.lock();
        let now = Utc::now();

        let mut history = self.load_history()?;
        let previous = history
            .iter()
            .position(|s| s.job_id == echo.job_id)
            .map(|i| history.remove(i));
        let snapshot = DeploySnapshot::from_echo(echo, previous.as_ref(), now);
        history.push(snapshot.clone());

        // A window reaching past the representable range keeps everything.
        if let Some(cutoff) = now.checked_sub_signed(self.max_age) {
            history.retain(|s| s.triggered_at >= cutoff);
        }
        if history.len() > self.max_entries {
            let excess = history.len() - self.max_entries;
            history.drain(..excess);
        }

        write_json(self.store.as_ref(), DEPLOY_NAMESPACE, HISTORY_KEY, &history)?;
        write_json(self.store.as_ref(), DEPLOY_NAMESPACE, CURRENT_KEY, &snapshot)?;
        info!("Deploy {} -> {}", snapshot.job_id, snapshot.status);
        debug!("Deploy history holds {} jobs", history.len());
        Ok(snapshot)
    }

    pub fn current(&self) -> Result<Option<DeploySnapshot>> {
        read_json(self.store.as_ref(), DEPLOY_NAMESPACE, CURRENT_KEY)
    }

    /// Most recent entries, oldest first.
    pub fn history(&self, limit: usize) -> Result<Vec<DeploySnapshot>> {
        let history = self.load_history()?;
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }

    fn load_history(&self) -> Result<Vec<DeploySnapshot>> {
        Ok(read_json(self.store.as_ref(), DEPLOY_NAMESPACE, HISTORY_KEY)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DeployStatus;
    use beehive_store::MemoryBlobStore;

    fn tracker(max: usize, days: i64) -> DeployTracker {
        DeployTracker::new(Arc::new(MemoryBlobStore::new()), max, days)
    }

    fn echo(job: &str, status: &str) -> DeployEcho {
        DeployEcho {
            job_id: job.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_one_history_entry_per_job() {
        let tracker = tracker(200, 120);
        for status in ["queued", "building", "success"] {
            tracker.echo_status(echo("J1", status)).unwrap();
        }
        let history = tracker.history(50).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].job_id, "J1");
        assert_eq!(history[0].status, DeployStatus::Success);
        assert_eq!(tracker.current().unwrap().unwrap().status, DeployStatus::Success);
    }

    #[test]
    fn test_distinct_jobs_are_preserved_in_order() {
        let tracker = tracker(200, 120);
        tracker.echo_status(echo("J1", "ok")).unwrap();
        tracker.echo_status(echo("J2", "error")).unwrap();
        tracker.echo_status(echo("J1", "building")).unwrap();

        let ids: Vec<_> = tracker.history(10).unwrap().into_iter().map(|s| s.job_id).collect();
        assert_eq!(ids, vec!["J2", "J1"]);
        assert_eq!(tracker.current().unwrap().unwrap().job_id, "J1");
    }

    #[test]
    fn test_count_bound_drops_oldest() {
        let tracker = tracker(3, 120);
        for i in 0..5 {
            tracker.echo_status(echo(&format!("J{}", i), "queued")).unwrap();
        }
        let ids: Vec<_> = tracker.history(10).unwrap().into_iter().map(|s| s.job_id).collect();
        assert_eq!(ids, vec!["J2", "J3", "J4"]);
    }

    #[test]
    fn test_age_bound_drops_stale_jobs() {
        let tracker = tracker(200, 120);
        let stale = DeployEcho {
            triggered_at: Some(Utc::now() - Duration::days(121)),
            ..echo("OLD", "success")
        };
        tracker.echo_status(stale).unwrap();
        tracker.echo_status(echo("NEW", "queued")).unwrap();

        let ids: Vec<_> = tracker.history(10).unwrap().into_iter().map(|s| s.job_id).collect();
        assert_eq!(ids, vec!["NEW"]);
    }

    #[test]
    fn test_huge_age_window_keeps_history() {
        for days in [1_000_000_000, i64::MAX] {
            let tracker = tracker(10, days);
            tracker.echo_status(echo("J1", "ok")).unwrap();
            tracker.echo_status(echo("J2", "building")).unwrap();
            assert_eq!(tracker.history(10).unwrap().len(), 2, "max_age_days={}", days);
            assert_eq!(tracker.current().unwrap().unwrap().job_id, "J2");
        }
    }

    #[test]
    fn test_unknown_status_is_queued_not_error() {
        let tracker = tracker(10, 120);
        let snapshot = tracker.echo_status(echo("J1", "bogus")).unwrap();
        assert_eq!(snapshot.status, DeployStatus::Queued);
    }

    #[test]
    fn test_empty_tracker_reads() {
        let tracker = tracker(10, 120);
        assert!(tracker.current().unwrap().is_none());
        assert!(tracker.history(10).unwrap().is_empty());
    }
}
