//! Deploy status vocabulary and snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use beehive_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Queued,
    Building,
    Deploying,
    Success,
    Failed,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map any upstream status string onto the fixed vocabulary. Unknown input is `queued`.
pub fn normalize_status(raw: &str) -> DeployStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "queued" => DeployStatus::Queued,
        "building" => DeployStatus::Building,
        "deploying" => DeployStatus::Deploying,
        "success" | "succeeded" | "ok" | "complete" => DeployStatus::Success,
        "failed" | "error" => DeployStatus::Failed,
        _ => DeployStatus::Queued,
    }
}

/// Inbound status echo from an emitter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployEcho {
    pub job_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub deploy_id: Option<String>,
    #[serde(default)]
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeployEcho {
    pub fn new(job_id: impl Into<String>, status: DeployStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status: status.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn parse(body: &serde_json::Value) -> Result<Self> {
        let echo: Self = serde_json::from_value(body.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid deploy status: {}", e)))?;
        if echo.job_id.trim().is_empty() {
            return Err(Error::InvalidInput("jobId must be non-empty".into()));
        }
        Ok(echo)
    }
}

/// Normalized, persisted deploy state for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySnapshot {
    pub job_id: String,
    pub status: DeployStatus,
    pub preview_url: Option<String>,
    pub deploy_id: Option<String>,
    pub artifact_url: Option<String>,
    pub size_bytes: Option<u64>,
    pub note: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeploySnapshot {
    /// Normalize an echo. `previous` is the last snapshot of the same job, if any.
    pub fn from_echo(
        echo: DeployEcho,
        previous: Option<&DeploySnapshot>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = normalize_status(&echo.status);
        let completed_at = echo
            .completed_at
            .or_else(|| status.is_terminal().then_some(now));

        Self {
            status,
            preview_url: echo
                .preview_url
                .or_else(|| previous.and_then(|p| p.preview_url.clone())),
            deploy_id: echo.deploy_id.or_else(|| previous.and_then(|p| p.deploy_id.clone())),
            artifact_url: echo
                .artifact_url
                .or_else(|| previous.and_then(|p| p.artifact_url.clone())),
            size_bytes: echo.size_bytes.or_else(|| previous.and_then(|p| p.size_bytes)),
            note: echo.note,
            triggered_at: echo
                .triggered_at
                .or_else(|| previous.map(|p| p.triggered_at))
                .unwrap_or(now),
            completed_at,
            job_id: echo.job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalization_table() {
        for raw in ["succeeded", "ok", "complete", "SUCCESS"] {
            assert_eq!(normalize_status(raw), DeployStatus::Success, "{}", raw);
        }
        assert_eq!(normalize_status("error"), DeployStatus::Failed);
        assert_eq!(normalize_status("failed"), DeployStatus::Failed);
        assert_eq!(normalize_status(" Building "), DeployStatus::Building);
        assert_eq!(normalize_status("deploying"), DeployStatus::Deploying);
        assert_eq!(normalize_status("bogus"), DeployStatus::Queued);
        assert_eq!(normalize_status(""), DeployStatus::Queued);
    }

    #[test]
    fn test_parse_requires_job_id() {
        assert!(DeployEcho::parse(&json!({"status": "ok"})).is_err());
        assert!(DeployEcho::parse(&json!({"jobId": " ", "status": "ok"})).is_err());
        let echo =
            DeployEcho::parse(&json!({"jobId": "J1", "status": "ok", "sizeBytes": 12})).unwrap();
        assert_eq!(echo.size_bytes, Some(12));
    }

    #[test]
    fn test_snapshot_inherits_from_previous_run_state() {
        let now = Utc::now();
        let first = DeploySnapshot::from_echo(
            DeployEcho {
                preview_url: Some("https://preview.example".into()),
                ..DeployEcho::new("J1", DeployStatus::Building)
            },
            None,
            now,
        );
        assert_eq!(first.triggered_at, now);
        assert!(first.completed_at.is_none());

        let later = now + chrono::Duration::seconds(30);
        let success = DeployEcho::new("J1", DeployStatus::Success);
        let done = DeploySnapshot::from_echo(success, Some(&first), later);
        assert_eq!(done.triggered_at, now);
        assert_eq!(done.completed_at, Some(later));
        assert_eq!(done.preview_url.as_deref(), Some("https://preview.example"));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let echo = DeployEcho::new("J9", DeployStatus::Queued);
        let snapshot = DeploySnapshot::from_echo(echo, None, Utc::now());
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["jobId"], "J9");
        assert_eq!(value["status"], "queued");
        assert!(value["previewUrl"].is_null());
    }
}
