//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_GIST_API_URL: &str = "https://api.github.com/gists";
pub const DEFAULT_MUTATION_HISTORY_MAX: usize = 1000;
pub const DEFAULT_DEPLOY_HISTORY_MAX: usize = 200;
pub const DEFAULT_DEPLOY_HISTORY_MAX_DAYS: i64 = 120;
pub const DEFAULT_DEDUP_TTL_SECS: u64 = 60;

/// Paths to the Beehive data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database holding the mutation log and deploy history (`data/beehive.db`).
    pub database: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            database: root.join("beehive.db"),
            root,
        })
    }
}

/// Top-level Beehive configuration.
///
/// Credentials are optional here; each consumer resolves the ones it needs
/// through the `require_*` helpers so a missing value surfaces as
/// [`Error::Configuration`] at the point of use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeehiveConfig {
    /// HTTP server port.
    pub port: u16,
    /// Base endpoint hosting the rituals (`{base}/<ritual-name>`).
    pub ritual_base_url: Option<String>,
    /// Shared capability credential, compared by equality.
    #[serde(skip_serializing)]
    pub capability_key: Option<String>,
    /// Source-control API token (changed-files listing, snippet channel).
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    /// Chat webhook channel.
    pub chat_webhook_url: Option<String>,
    /// Snippet service endpoint.
    pub gist_api_url: String,
    /// Build-hook targets fired by a deploy run.
    pub build_hook_urls: Vec<String>,
    /// Bound of the mutation history list.
    pub mutation_history_max: usize,
    /// Bound of the deploy history list (count).
    pub deploy_history_max: usize,
    /// Bound of the deploy history list (age in days).
    pub deploy_history_max_days: i64,
    /// Window in which a repeated (proposal, head commit) trigger is collapsed.
    pub dedup_ttl_secs: u64,
    /// Per-request timeout for outbound HTTP; `None` keeps the transport default.
    pub http_timeout_secs: Option<u64>,
}

impl Default for BeehiveConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ritual_base_url: None,
            capability_key: None,
            github_token: None,
            chat_webhook_url: None,
            gist_api_url: DEFAULT_GIST_API_URL.into(),
            build_hook_urls: Vec::new(),
            mutation_history_max: DEFAULT_MUTATION_HISTORY_MAX,
            deploy_history_max: DEFAULT_DEPLOY_HISTORY_MAX,
            deploy_history_max_days: DEFAULT_DEPLOY_HISTORY_MAX_DAYS,
            dedup_ttl_secs: DEFAULT_DEDUP_TTL_SECS,
            http_timeout_secs: None,
        }
    }
}

impl BeehiveConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let build_hook_urls = get("BUILD_HOOK_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            port: get("PORT").and_then(|p| p.parse().ok()).unwrap_or(defaults.port),
            ritual_base_url: get("BEEHIVE_RITUAL_BASE_URL").or_else(|| get("URL")),
            capability_key: get("CODEX_CAPABILITY_KEY"),
            github_token: get("GITHUB_PAT"),
            chat_webhook_url: get("DISCORD_WEBHOOK_URL"),
            gist_api_url: get("GIST_API_URL").unwrap_or(defaults.gist_api_url),
            build_hook_urls,
            mutation_history_max: get("MUTATION_HISTORY_MAX")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.mutation_history_max),
            deploy_history_max: get("DEPLOY_HISTORY_MAX")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.deploy_history_max),
            deploy_history_max_days: get("DEPLOY_HISTORY_MAX_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.deploy_history_max_days),
            dedup_ttl_secs: get("DEDUP_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dedup_ttl_secs),
            http_timeout_secs: get("HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
        }
    }

    pub fn require_ritual_base_url(&self) -> Result<&str> {
        require(self.ritual_base_url.as_deref(), "BEEHIVE_RITUAL_BASE_URL")
    }

    pub fn require_capability_key(&self) -> Result<&str> {
        require(self.capability_key.as_deref(), "CODEX_CAPABILITY_KEY")
    }

    pub fn require_github_token(&self) -> Result<&str> {
        require(self.github_token.as_deref(), "GITHUB_PAT")
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value.ok_or_else(|| {
        Error::configuration(format!("Missing required environment variable: {}", name))
    })
}
