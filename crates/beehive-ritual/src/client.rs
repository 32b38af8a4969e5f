//! Invocation client: one HTTP call per ritual, no retries.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use beehive_core::{BeehiveConfig, Error, Result};

pub const CAPABILITY_HEADER: &str = "x-codex-capability";
pub const ACTOR_HEADER: &str = "x-codex-actor";
pub const JOB_ID_HEADER: &str = "x-codex-job-id";

/// Longest response body kept in an [`Error::Invocation`].
const BODY_SNIPPET_CHARS: usize = 500;

/// Per-call overrides of the configured endpoint and credential.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub base_url: Option<String>,
    pub capability_key: Option<String>,
    pub headers: HashMap<String, String>,
}

impl InvokeOptions {
    /// Options carrying only the correlation header for `job_id`.
    pub fn for_job(job_id: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert(JOB_ID_HEADER.to_string(), job_id.to_string());
        Self {
            headers,
            ..Default::default()
        }
    }
}

/// A ritual's answer: parsed JSON when possible, otherwise the raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum RitualResponse {
    Json(Value),
    Text(String),
}

impl RitualResponse {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// JSON view of the response; text becomes a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }
}

#[async_trait]
pub trait RitualInvoker: Send + Sync {
    async fn invoke(
        &self,
        ritual: &str,
        payload: &Value,
        actor: &str,
        options: &InvokeOptions,
    ) -> Result<RitualResponse>;

    /// Fail with a configuration error when no call could be made with `options`.
    fn ensure_ready(&self, _options: &InvokeOptions) -> Result<()> {
        Ok(())
    }
}

/// Invokes rituals over HTTP at `{base}/{ritual}`.
pub struct HttpRitualClient {
    client: Client,
    base_url: Option<String>,
    capability_key: Option<String>,
}

impl HttpRitualClient {
    pub fn new(config: &BeehiveConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client init failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.ritual_base_url.clone(),
            capability_key: config.capability_key.clone(),
        })
    }

    fn resolve<'a>(&'a self, options: &'a InvokeOptions) -> Result<(&'a str, &'a str)> {
        let base_url = options
            .base_url
            .as_deref()
            .or(self.base_url.as_deref())
            .ok_or_else(|| missing("BEEHIVE_RITUAL_BASE_URL"))?;
        let capability_key = options
            .capability_key
            .as_deref()
            .or(self.capability_key.as_deref())
            .ok_or_else(|| missing("CODEX_CAPABILITY_KEY"))?;
        Ok((base_url, capability_key))
    }
}

fn missing(name: &str) -> Error {
    Error::configuration(format!("Missing required environment variable: {}", name))
}

#[async_trait]
impl RitualInvoker for HttpRitualClient {
    async fn invoke(
        &self,
        ritual: &str,
        payload: &Value,
        actor: &str,
        options: &InvokeOptions,
    ) -> Result<RitualResponse> {
        let (base_url, capability_key) = self.resolve(options)?;
        let endpoint = ritual_endpoint(base_url, ritual);
        debug!("Invoking ritual {} at {}", ritual, endpoint);

        let mut request = self
            .client
            .post(&endpoint)
            .header(CAPABILITY_HEADER, capability_key)
            .header(ACTOR_HEADER, actor)
            .json(payload);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| Error::Transport {
            target: ritual.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| Error::Transport {
            target: ritual.to_string(),
            message: format!("Failed to read body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Error::Invocation {
                ritual: ritual.to_string(),
                status: status.as_u16(),
                body: snippet(&text),
            });
        }

        Ok(RitualResponse::parse(text))
    }

    fn ensure_ready(&self, options: &InvokeOptions) -> Result<()> {
        self.resolve(options).map(|_| ())
    }
}

pub fn ritual_endpoint(base_url: &str, ritual: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), ritual)
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= BODY_SNIPPET_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(BODY_SNIPPET_CHARS).collect();
    format!("{}…", cut)
}
