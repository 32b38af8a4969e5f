//! Build-hook POST with bounded exponential backoff.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use beehive_core::{Error, Result};

const RESPONSE_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given zero-based attempt: `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookReceipt {
    pub status: u16,
    pub snippet: String,
    pub attempts: u32,
}

/// POST `body` (or an empty body) to `url`, retrying non-2xx and transport errors.
///
/// Exhaustion fails only this target.
pub async fn post_with_retry(
    client: &Client,
    url: &str,
    body: Option<&serde_json::Value>,
    policy: RetryPolicy,
) -> Result<HookReceipt> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        let mut request = client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                debug!("Build hook {} answered {} on attempt {}", url, status, attempt + 1);
                return Ok(HookReceipt {
                    status,
                    snippet: text.chars().take(RESPONSE_SNIPPET_CHARS).collect(),
                    attempts: attempt + 1,
                });
            }
            Ok(response) => last_error = format!("HTTP {}", response.status().as_u16()),
            Err(e) => last_error = e.to_string(),
        }

        if attempt + 1 < attempts {
            let delay = policy.delay_for(attempt);
            warn!(
                "Build hook {} attempt {} failed ({}), retrying in {:?}",
                url,
                attempt + 1,
                last_error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(Error::Transport {
        target: url.to_string(),
        message: format!("Build hook failed after {} attempts: {}", attempts, last_error),
    })
}
