//! Overlay metadata: per-run counters derived once from the changed files.

use serde::{Deserialize, Serialize};

/// One changed file as handed to the rituals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffArtifact {
    pub filename: String,
    #[serde(default)]
    pub patch: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

/// Derived counters threaded through every ritual call and the final record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub job_id: String,
    pub proposal_number: u64,
    pub head_commit: String,
    pub file_count: usize,
    pub additions: u64,
    pub deletions: u64,
    /// Sum of patch lengths in bytes.
    pub patch_bytes: u64,
}

impl Overlay {
    pub fn compute(
        job_id: impl Into<String>,
        proposal_number: u64,
        head_commit: impl Into<String>,
        diffs: &[DiffArtifact],
    ) -> Self {
        Self {
            job_id: job_id.into(),
            proposal_number,
            head_commit: head_commit.into(),
            file_count: diffs.len(),
            additions: diffs.iter().map(|d| d.additions).sum(),
            deletions: diffs.iter().map(|d| d.deletions).sum(),
            patch_bytes: diffs.iter().map(|d| d.patch.len() as u64).sum(),
        }
    }
}

/// Generate a fresh job id for one orchestrator run.
pub fn new_job_id() -> String {
    format!("job-{}", uuid::Uuid::new_v4())
}
