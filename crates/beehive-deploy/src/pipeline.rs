//! Deploy run: status echoes around a concurrent build-hook fanout.
//!
//! queued → building → (hooks) → deploying → success, or → failed when no
//! hook accepted the build. A failing hook never aborts its siblings.

use std::sync::Arc;

use futures::future::join_all;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use beehive_core::Result;

use crate::badge::{deploy_badge, Badge};
use crate::retry::{post_with_retry, RetryPolicy};
use crate::status::{DeployEcho, DeploySnapshot, DeployStatus};
use crate::tracker::DeployTracker;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookResult {
    pub target: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub snapshot: DeploySnapshot,
    pub hooks: Vec<HookResult>,
    pub badge: Badge,
}

impl DeployOutcome {
    pub fn succeeded(&self) -> bool {
        self.snapshot.status == DeployStatus::Success
    }
}

pub struct DeployPipeline {
    tracker: Arc<DeployTracker>,
    client: Client,
    hooks: Vec<String>,
    policy: RetryPolicy,
}

impl DeployPipeline {
    pub fn new(tracker: Arc<DeployTracker>, client: Client, hooks: Vec<String>) -> Self {
        Self {
            tracker,
            client,
            hooks,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run(&self, request: DeployRequest) -> Result<DeployOutcome> {
        let job_id = request
            .job_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("deploy-{}", uuid::Uuid::new_v4()));
        info!("Deploy run {} with {} build hooks", job_id, self.hooks.len());

        self.tracker.echo_status(
            DeployEcho::new(&job_id, DeployStatus::Queued)
                .with_note(request.note.unwrap_or_else(|| "deploy queued".into())),
        )?;

        if self.hooks.is_empty() {
            let echo = DeployEcho::new(&job_id, DeployStatus::Failed)
                .with_note("No build hooks configured");
            let snapshot = self.tracker.echo_status(echo)?;
            return Ok(self.outcome(snapshot, Vec::new()));
        }

        self.tracker.echo_status(
            DeployEcho::new(&job_id, DeployStatus::Building)
                .with_note(format!("triggering {} build hooks", self.hooks.len())),
        )?;

        let hooks = self.trigger_hooks(&job_id).await;
        let failed: Vec<&str> = hooks.iter().filter(|h| !h.ok).map(|h| h.target.as_str()).collect();
        let accepted = hooks.len() - failed.len();

        let snapshot = if accepted == 0 {
            warn!("Deploy {}: every build hook failed", job_id);
            self.tracker.echo_status(
                DeployEcho::new(&job_id, DeployStatus::Failed).with_note("all build hooks failed"),
            )?
        } else {
            self.tracker.echo_status(
                DeployEcho::new(&job_id, DeployStatus::Deploying)
                    .with_note(format!("{}/{} build hooks accepted", accepted, hooks.len())),
            )?;
            let note = if failed.is_empty() {
                "deploy succeeded".to_string()
            } else {
                format!("deploy succeeded; failed targets: {}", failed.join(", "))
            };
            self.tracker
                .echo_status(DeployEcho::new(&job_id, DeployStatus::Success).with_note(note))?
        };

        Ok(self.outcome(snapshot, hooks))
    }

    async fn trigger_hooks(&self, job_id: &str) -> Vec<HookResult> {
        let body = serde_json::json!({ "jobId": job_id });
        let attempts = self.hooks.iter().enumerate().map(|(i, url)| {
            let body = &body;
            async move {
                let target = hook_label(url, i);
                match post_with_retry(&self.client, url, Some(body), self.policy).await {
                    Ok(receipt) => HookResult {
                        target,
                        ok: true,
                        status: Some(receipt.status),
                        attempts: receipt.attempts,
                        error: None,
                    },
                    Err(e) => HookResult {
                        target,
                        ok: false,
                        status: None,
                        attempts: self.policy.max_attempts,
                        error: Some(e.to_string()),
                    },
                }
            }
        });
        join_all(attempts).await
    }

    fn outcome(&self, snapshot: DeploySnapshot, hooks: Vec<HookResult>) -> DeployOutcome {
        DeployOutcome {
            badge: deploy_badge(Some(&snapshot)),
            snapshot,
            hooks,
        }
    }
}

/// Hook URLs carry secrets in the path; report only host and position.
fn hook_label(url: &str, index: usize) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| "hook".into());
    format!("{}#{}", host, index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use beehive_store::MemoryBlobStore;

    async fn hook(status: StatusCode) -> String {
        let app = Router::new().route("/hook", post(move || async move { (status, "") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/hook", addr)
    }

    fn pipeline(hooks: Vec<String>) -> (DeployPipeline, Arc<DeployTracker>) {
        let tracker = Arc::new(DeployTracker::new(Arc::new(MemoryBlobStore::new()), 200, 120));
        let pipeline =
            DeployPipeline::new(tracker.clone(), Client::new(), hooks).with_policy(RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_attempts: 2,
            });
        (pipeline, tracker)
    }

    #[tokio::test]
    async fn test_partial_hook_failure_still_succeeds() {
        let good = hook(StatusCode::OK).await;
        let bad = hook(StatusCode::BAD_GATEWAY).await;
        let (pipeline, tracker) = pipeline(vec![good, bad]);

        let outcome = pipeline
            .run(DeployRequest {
                job_id: Some("J7".into()),
                note: None,
            })
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.hooks.iter().filter(|h| h.ok).count(), 1);
        assert!(outcome.snapshot.note.as_deref().unwrap().contains("failed targets: 127.0.0.1#2"));
        assert_eq!(outcome.badge.color, "green");

        let history = tracker.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, DeployStatus::Success);
        assert!(history[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_all_hooks_failing_marks_failed() {
        let bad = hook(StatusCode::INTERNAL_SERVER_ERROR).await;
        let (pipeline, tracker) = pipeline(vec![bad]);
        let outcome = pipeline.run(DeployRequest::default()).await.unwrap();

        assert!(!outcome.succeeded());
        assert_eq!(outcome.snapshot.status, DeployStatus::Failed);
        assert_eq!(outcome.badge.color, "red");
        assert!(outcome.snapshot.job_id.starts_with("deploy-"));
        assert_eq!(outcome.hooks[0].attempts, 2);
        assert_eq!(tracker.current().unwrap().unwrap().status, DeployStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_hooks_fails_without_network() {
        let (pipeline, _) = pipeline(Vec::new());
        let outcome = pipeline.run(DeployRequest::default()).await.unwrap();
        assert_eq!(outcome.snapshot.status, DeployStatus::Failed);
        assert!(outcome.hooks.is_empty());
    }

    #[test]
    fn test_hook_label_hides_path() {
        assert_eq!(
            hook_label("https://api.example.com/build_hooks/secret", 0),
            "api.example.com#1"
        );
        assert_eq!(hook_label("not a url", 2), "hook#3");
    }
}
