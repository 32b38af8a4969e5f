//! Broadcast fanout: one final outcome delivered to every channel.
//!
//! External channels run concurrently and never block each other. A channel
//! with no configuration is `skipped`; a failing one is `error` and gets a
//! secondary record in the mutation log. The dashboard channel is the
//! primary mutation-log write itself and always comes first in the results.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use beehive_core::{Error, Result};
use beehive_store::{MutationLog, MutationRecord, MutationStatus};

pub const BROADCAST_RITUAL: &str = "broadcast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelName {
    Dashboard,
    Chat,
    Snippet,
}

impl ChannelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Chat => "chat",
            Self::Snippet => "snippet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Success,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelResult {
    pub channel: ChannelName,
    pub status: ChannelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Inbound broadcast body.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ritual_status: String,
    #[serde(default)]
    pub ritual_outputs: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl BroadcastRequest {
    pub fn parse(body: &Value) -> Result<Self> {
        let request: Self = serde_json::from_value(body.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid broadcast payload: {}", e)))?;
        if request.message.trim().is_empty() || request.ritual_status.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Missing required payload: message or ritual_status".into(),
            ));
        }
        Ok(request)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.ritual_status.trim().to_ascii_lowercase().as_str(),
            "success" | "ok" | "pass"
        )
    }

    fn lookup(&self, key: &str) -> Value {
        [&self.ritual_outputs, &self.payload]
            .into_iter()
            .flatten()
            .find_map(|v| v.get(key).filter(|v| !v.is_null()).cloned())
            .unwrap_or(Value::Null)
    }

    pub fn job_id(&self) -> Value {
        self.lookup("jobId")
    }

    pub fn size_bytes(&self) -> Value {
        self.lookup("sizeBytes")
    }

    fn pr_label(&self) -> String {
        self.pr_number
            .map(|n| format!("#{}", n))
            .unwrap_or_else(|| "N/A".into())
    }
}

/// What a channel hands back on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Delivery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Channel-specific summary kept in the dashboard record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> ChannelName;

    /// `Some(reason)` when the channel is not configured.
    fn skip_reason(&self) -> Option<String>;

    async fn deliver(&self, request: &BroadcastRequest, actor: &str) -> Result<Delivery>;
}

/// Chat webhook (`{content}` body).
pub struct ChatWebhookChannel {
    client: Client,
    webhook_url: Option<String>,
}

impl ChatWebhookChannel {
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        Self { client, webhook_url }
    }
}

pub fn chat_content(request: &BroadcastRequest) -> String {
    let status = if request.is_success() {
        "✅ Success"
    } else {
        "❌ Failure"
    };
    [
        "🐝 **Beehive Broadcast**".to_string(),
        format!("**PR:** {}", request.pr_label()),
        format!("**Status:** {}", status),
        format!("**Message:** {}", request.message),
    ]
    .join("\n")
}

#[async_trait]
impl DeliveryChannel for ChatWebhookChannel {
    fn name(&self) -> ChannelName {
        ChannelName::Chat
    }

    fn skip_reason(&self) -> Option<String> {
        self.webhook_url
            .is_none()
            .then(|| "Missing DISCORD_WEBHOOK_URL".to_string())
    }

    async fn deliver(&self, request: &BroadcastRequest, _actor: &str) -> Result<Delivery> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or_else(|| channel_error(self.name(), "not configured"))?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "content": chat_content(request) }))
            .send()
            .await
            .map_err(|e| channel_error(self.name(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(channel_error(
                self.name(),
                format!("webhook responded with {}: {}", status.as_u16(), detail),
            ));
        }
        Ok(Delivery::default())
    }
}

/// Public snippet (gist) with a markdown rendering of the outcome.
pub struct SnippetChannel {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl SnippetChannel {
    pub fn new(client: Client, api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            token,
        }
    }
}

/// `pr-<n>-broadcast-<timestamp>.md`, with `:` and `.` made filename-safe.
pub fn snippet_file_name(pr_number: Option<u64>, timestamp: &str) -> String {
    let pr = pr_number
        .map(|n| format!("pr-{}", n))
        .unwrap_or_else(|| "pr-na".into());
    format!("{}-broadcast-{}.md", pr, timestamp.replace([':', '.'], "-"))
}

fn json_section(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "_No data provided._".into(),
        Some(value) => match serde_json::to_string_pretty(value) {
            Ok(text) => format!("```json\n{}\n```", text),
            Err(_) => "_Unable to serialize data._".into(),
        },
    }
}

fn display_or_na(value: &Value) -> String {
    match value {
        Value::Null => "N/A".into(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn snippet_markdown(request: &BroadcastRequest, actor: &str, timestamp: &str) -> String {
    [
        "# Beehive Broadcast".to_string(),
        String::new(),
        format!("- **PR:** {}", request.pr_label()),
        format!("- **Status:** {}", request.ritual_status),
        format!("- **Message:** {}", request.message),
        format!("- **Actor:** {}", actor),
        format!("- **Timestamp:** {}", timestamp),
        format!("- **Job ID:** {}", display_or_na(&request.job_id())),
        format!("- **Size (bytes):** {}", display_or_na(&request.size_bytes())),
        String::new(),
        "## Ritual Outputs".to_string(),
        json_section(request.ritual_outputs.as_ref()),
        String::new(),
        "## Payload".to_string(),
        json_section(request.payload.as_ref()),
    ]
    .join("\n")
}

#[async_trait]
impl DeliveryChannel for SnippetChannel {
    fn name(&self) -> ChannelName {
        ChannelName::Snippet
    }

    fn skip_reason(&self) -> Option<String> {
        self.token.is_none().then(|| "Missing GITHUB_PAT".to_string())
    }

    async fn deliver(&self, request: &BroadcastRequest, actor: &str) -> Result<Delivery> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| channel_error(self.name(), "not configured"))?;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let file_name = snippet_file_name(request.pr_number, &timestamp);

        let mut files = serde_json::Map::new();
        files.insert(
            file_name.clone(),
            json!({ "content": snippet_markdown(request, actor, &timestamp) }),
        );
        let body = json!({
            "description": format!("Beehive broadcast for PR {}", request.pr_label()),
            "public": true,
            "files": files,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "beehive")
            .json(&body)
            .send()
            .await
            .map_err(|e| channel_error(self.name(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(channel_error(
                self.name(),
                format!("snippet API responded with {}: {}", status.as_u16(), detail),
            ));
        }

        let created: Value = response
            .json()
            .await
            .map_err(|e| channel_error(self.name(), format!("invalid response: {}", e)))?;
        let id = created.get("id").and_then(Value::as_str).map(String::from);
        let url = created.get("html_url").and_then(Value::as_str).map(String::from);

        Ok(Delivery {
            detail: id.as_ref().map(|id| format!("gist:{}", id)),
            summary: Some(json!({ "id": id, "url": url, "file": file_name })),
            url,
        })
    }
}

fn channel_error(channel: ChannelName, detail: impl Into<String>) -> Error {
    Error::Channel {
        channel: channel.as_str().to_string(),
        detail: detail.into(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub message: String,
    pub results: Vec<ChannelResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<Value>,
}

impl BroadcastReport {
    pub fn result(&self, channel: ChannelName) -> Option<&ChannelResult> {
        self.results.iter().find(|r| r.channel == channel)
    }
}

pub struct BroadcastFanout {
    channels: Vec<Arc<dyn DeliveryChannel>>,
    log: Arc<MutationLog>,
}

impl BroadcastFanout {
    pub fn new(channels: Vec<Arc<dyn DeliveryChannel>>, log: Arc<MutationLog>) -> Self {
        Self { channels, log }
    }

    /// Deliver to every channel. Never fails; inspect the results for partial failure.
    pub async fn broadcast(&self, request: &BroadcastRequest, actor: &str) -> BroadcastReport {
        let base_metadata = self.announce(request);
        let (mut results, summaries) = self.deliver_all(request, actor, &base_metadata).await;

        let dashboard = self.record_outcome(request, actor, &base_metadata, &results, &summaries);
        results.insert(0, dashboard);
        report(results, summaries)
    }

    /// Deliver to the external channels only.
    ///
    /// For callers that have already written the primary mutation record; the
    /// dashboard result is `skipped`. Channel failures are still recorded.
    pub async fn relay(&self, request: &BroadcastRequest, actor: &str) -> BroadcastReport {
        let base_metadata = self.announce(request);
        let (mut results, summaries) = self.deliver_all(request, actor, &base_metadata).await;

        results.insert(
            0,
            ChannelResult {
                channel: ChannelName::Dashboard,
                status: ChannelStatus::Skipped,
                detail: Some("Primary record already written".into()),
                url: None,
            },
        );
        report(results, summaries)
    }

    fn announce(&self, request: &BroadcastRequest) -> Value {
        info!(
            "Broadcasting: {} (status: {}) for PR {}",
            request.message,
            request.ritual_status,
            request.pr_label()
        );
        json!({
            "status": request.ritual_status,
            "prNumber": request.pr_number,
            "jobId": request.job_id(),
            "sizeBytes": request.size_bytes(),
        })
    }

    async fn deliver_all(
        &self,
        request: &BroadcastRequest,
        actor: &str,
        base_metadata: &Value,
    ) -> (Vec<ChannelResult>, serde_json::Map<String, Value>) {
        let attempts = self.channels.iter().map(|channel| async move {
            if let Some(reason) = channel.skip_reason() {
                return (channel.name(), Err(reason));
            }
            (channel.name(), Ok(channel.deliver(request, actor).await))
        });

        let mut results = Vec::with_capacity(self.channels.len() + 1);
        let mut summaries = serde_json::Map::new();
        for (name, attempt) in join_all(attempts).await {
            let result = match attempt {
                Err(reason) => ChannelResult {
                    channel: name,
                    status: ChannelStatus::Skipped,
                    detail: Some(reason),
                    url: None,
                },
                Ok(Ok(delivery)) => {
                    info!("Broadcast to {} complete", name.as_str());
                    if let Some(summary) = delivery.summary {
                        summaries.insert(name.as_str().to_string(), summary);
                    }
                    ChannelResult {
                        channel: name,
                        status: ChannelStatus::Success,
                        detail: delivery.detail,
                        url: delivery.url,
                    }
                }
                Ok(Err(err)) => {
                    let detail = match err {
                        Error::Channel { detail, .. } => detail,
                        other => other.to_string(),
                    };
                    warn!("Broadcast to {} failed: {}", name.as_str(), detail);
                    self.record_channel_failure(name, &detail, request, actor, base_metadata);
                    ChannelResult {
                        channel: name,
                        status: ChannelStatus::Error,
                        detail: Some(detail),
                        url: None,
                    }
                }
            };
            results.push(result);
        }
        (results, summaries)
    }

    fn record_channel_failure(
        &self,
        channel: ChannelName,
        detail: &str,
        request: &BroadcastRequest,
        actor: &str,
        base_metadata: &Value,
    ) {
        let mut metadata = base_metadata.clone();
        metadata["channel"] = json!(channel);
        metadata["channelStatus"] = json!(ChannelStatus::Error);
        metadata["error"] = json!(detail);
        metadata["payload"] = json!({ "pr_number": request.pr_number });

        self.log.append(
            MutationRecord::fail(
                actor,
                BROADCAST_RITUAL,
                format!("{} broadcast failed: {}", channel.as_str(), detail),
            )
            .with_metadata(metadata),
        );
    }

    /// The dashboard channel: the primary mutation-log write.
    fn record_outcome(
        &self,
        request: &BroadcastRequest,
        actor: &str,
        base_metadata: &Value,
        results: &[ChannelResult],
        summaries: &serde_json::Map<String, Value>,
    ) -> ChannelResult {
        let mut targets = vec![ChannelName::Dashboard];
        targets.extend(
            results
                .iter()
                .filter(|r| r.status == ChannelStatus::Success)
                .map(|r| r.channel),
        );

        let mut metadata = base_metadata.clone();
        metadata["channels"] = json!(results);
        metadata["targets"] = json!(targets);
        metadata["summaries"] = Value::Object(summaries.clone());
        metadata["ritualOutputs"] = request.ritual_outputs.clone().unwrap_or(Value::Null);
        metadata["payload"] = request.payload.clone().unwrap_or(Value::Null);

        let status = if request.is_success() {
            MutationStatus::Ok
        } else {
            MutationStatus::Fail
        };
        let message = format!("Broadcast: {}", request.message);
        let record =
            MutationRecord::new(status, actor, BROADCAST_RITUAL, message).with_metadata(metadata);

        if self.log.append(record) {
            ChannelResult {
                channel: ChannelName::Dashboard,
                status: ChannelStatus::Success,
                detail: None,
                url: None,
            }
        } else {
            ChannelResult {
                channel: ChannelName::Dashboard,
                status: ChannelStatus::Error,
                detail: Some("Mutation log write failed".into()),
                url: None,
            }
        }
    }
}

fn report(
    results: Vec<ChannelResult>,
    mut summaries: serde_json::Map<String, Value>,
) -> BroadcastReport {
    BroadcastReport {
        message: "Broadcast completed.".into(),
        results,
        snippet: summaries.remove(ChannelName::Snippet.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use beehive_store::{BlobStore, MemoryBlobStore};

    fn request() -> BroadcastRequest {
        BroadcastRequest::parse(&json!({
            "pr_number": 42,
            "message": "Review sealed",
            "ritual_status": "success",
            "ritual_outputs": {"jobId": "job-7", "risk": {"level": "low"}},
            "payload": {"sizeBytes": 1024}
        }))
        .unwrap()
    }

    fn memory_log() -> Arc<MutationLog> {
        Arc::new(MutationLog::new(Arc::new(MemoryBlobStore::new()), 100))
    }

    fn unconfigured() -> Vec<Arc<dyn DeliveryChannel>> {
        vec![
            Arc::new(ChatWebhookChannel::new(Client::new(), None)),
            Arc::new(SnippetChannel::new(Client::new(), "http://127.0.0.1:9/gists", None)),
        ]
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_requires_message_and_status() {
        let err = BroadcastRequest::parse(&json!({"message": "hi"})).unwrap_err();
        assert!(err.to_string().contains("ritual_status"));
        assert!(BroadcastRequest::parse(&json!({"message": "hi", "ritual_status": "ok"})).is_ok());
    }

    #[test]
    fn test_request_lookups_prefer_outputs() {
        let request = request();
        assert_eq!(request.job_id(), json!("job-7"));
        assert_eq!(request.size_bytes(), json!(1024));
        assert!(request.is_success());
    }

    #[test]
    fn test_snippet_file_name() {
        assert_eq!(
            snippet_file_name(Some(42), "2026-01-02T03:04:05.678Z"),
            "pr-42-broadcast-2026-01-02T03-04-05-678Z.md"
        );
        assert!(snippet_file_name(None, "t").starts_with("pr-na-"));
    }

    #[test]
    fn test_markdown_renders_sections() {
        let text = snippet_markdown(&request(), "bot", "now");
        assert!(text.contains("- **PR:** #42"));
        assert!(text.contains("- **Job ID:** job-7"));
        assert!(text.contains("```json"));
        let bare =
            BroadcastRequest::parse(&json!({"message": "m", "ritual_status": "fail"})).unwrap();
        assert!(snippet_markdown(&bare, "bot", "now").contains("_No data provided._"));
    }

    #[tokio::test]
    async fn test_dashboard_only_marks_others_skipped() {
        let log = memory_log();
        let fanout = BroadcastFanout::new(unconfigured(), log.clone());
        let report = fanout.broadcast(&request(), "bot").await;

        let statuses: Vec<_> = report.results.iter().map(|r| (r.channel, r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (ChannelName::Dashboard, ChannelStatus::Success),
                (ChannelName::Chat, ChannelStatus::Skipped),
                (ChannelName::Snippet, ChannelStatus::Skipped),
            ]
        );
        let records = log.recent(10);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "Broadcast: Review sealed");
        assert_eq!(records[0].metadata["jobId"], "job-7");
    }

    #[tokio::test]
    async fn test_failing_channel_is_isolated_and_recorded() {
        let chat = spawn(Router::new().route(
            "/hook",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        ))
        .await;
        let gist = spawn(Router::new().route(
            "/gists",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["public"], true);
                Json(json!({"id": "g1", "html_url": "https://gist.example/g1"}))
            }),
        ))
        .await;

        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(ChatWebhookChannel::new(Client::new(), Some(format!("{}/hook", chat)))),
            Arc::new(SnippetChannel::new(
                Client::new(),
                format!("{}/gists", gist),
                Some("pat".into()),
            )),
        ];
        let log = memory_log();
        let report = BroadcastFanout::new(channels, log.clone()).broadcast(&request(), "bot").await;

        let chat_result = report.result(ChannelName::Chat).unwrap();
        assert_eq!(chat_result.status, ChannelStatus::Error);
        assert!(chat_result.detail.as_deref().unwrap().contains("500"));

        let snippet_result = report.result(ChannelName::Snippet).unwrap();
        assert_eq!(snippet_result.status, ChannelStatus::Success);
        assert_eq!(snippet_result.url.as_deref(), Some("https://gist.example/g1"));
        assert_eq!(report.snippet.as_ref().unwrap()["id"], "g1");

        // Secondary failure record first, then the primary outcome.
        let records = log.recent(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, MutationStatus::Fail);
        assert!(records[0].message.starts_with("chat broadcast failed"));
        assert_eq!(records[1].status, MutationStatus::Ok);
        assert_eq!(records[1].metadata["targets"], json!(["dashboard", "snippet"]));
    }

    #[tokio::test]
    async fn test_relay_skips_dashboard_and_records_channel_failures() {
        let chat = spawn(Router::new().route(
            "/hook",
            post(|| async { (StatusCode::BAD_GATEWAY, "gone") }),
        ))
        .await;
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(ChatWebhookChannel::new(Client::new(), Some(format!("{}/hook", chat)))),
            Arc::new(SnippetChannel::new(Client::new(), "http://127.0.0.1:9/gists", None)),
        ];
        let log = memory_log();
        let report = BroadcastFanout::new(channels, log.clone()).relay(&request(), "bot").await;

        let dashboard = report.result(ChannelName::Dashboard).unwrap();
        assert_eq!(dashboard.status, ChannelStatus::Skipped);
        assert_eq!(report.result(ChannelName::Chat).unwrap().status, ChannelStatus::Error);

        // Only the secondary channel-failure record; no primary outcome.
        let records = log.recent(10);
        assert_eq!(records.len(), 1);
        assert!(records[0].message.starts_with("chat broadcast failed"));
    }

    struct BrokenStore;

    impl BlobStore for BrokenStore {
        fn get(&self, _: &str, _: &str) -> Result<Option<Value>> {
            Err(Error::Persistence("offline".into()))
        }

        fn set(&self, _: &str, _: &str, _: &Value) -> Result<()> {
            Err(Error::Persistence("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_dashboard_failure_is_reported_not_raised() {
        let log = Arc::new(MutationLog::new(Arc::new(BrokenStore), 10));
        let report = BroadcastFanout::new(unconfigured(), log).broadcast(&request(), "bot").await;
        let dashboard = report.result(ChannelName::Dashboard).unwrap();
        assert_eq!(dashboard.status, ChannelStatus::Error);
        assert_eq!(report.results.len(), 3);
    }
}
