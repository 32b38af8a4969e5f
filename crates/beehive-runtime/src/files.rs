//! Changed-files sources.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use beehive_core::{DiffArtifact, Error, Result};

use crate::trigger::Proposal;

/// Page size requested from the listing API.
pub const FILES_PER_PAGE: usize = 100;
/// The listing API stops serving after this many pages.
pub const MAX_PAGES: usize = 30;

#[async_trait]
pub trait ChangedFilesSource: Send + Sync {
    /// List the proposal's changed files. `token` is the source-control credential.
    async fn list(&self, proposal: &Proposal, token: &str) -> Result<Vec<DiffArtifact>>;
}

/// Paginated GitHub-style listing at the proposal's `filesUrl`.
pub struct GitHubFilesSource {
    client: Client,
    max_pages: usize,
}

impl GitHubFilesSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_pages: MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }
}

#[async_trait]
impl ChangedFilesSource for GitHubFilesSource {
    async fn list(&self, proposal: &Proposal, token: &str) -> Result<Vec<DiffArtifact>> {
        let files_url = proposal
            .files_url
            .as_deref()
            .ok_or_else(|| {
                Error::InvalidInput(format!("Proposal #{} has no filesUrl", proposal.number))
            })?;

        let mut diffs = Vec::new();
        for page in 1..=self.max_pages {
            let response = self
                .client
                .get(files_url)
                .query(&[("per_page", FILES_PER_PAGE), ("page", page)])
                .header("Authorization", format!("Bearer {}", token))
                .header("Accept", "application/vnd.github.v3+json")
                .header("User-Agent", "beehive")
                .send()
                .await
                .map_err(|e| Error::Transport {
                    target: files_url.to_string(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(Error::Internal(format!(
                    "Failed to retrieve PR files: {} {}",
                    status.as_u16(),
                    detail
                )));
            }

            let batch: Vec<DiffArtifact> = response.json().await.map_err(|e| Error::Transport {
                target: files_url.to_string(),
                message: format!("Invalid files listing: {}", e),
            })?;
            let full_page = batch.len() == FILES_PER_PAGE;
            diffs.extend(batch);
            debug!("Fetched page {} of changed files ({} so far)", page, diffs.len());
            if !full_page {
                return Ok(diffs);
            }
        }
        warn!(
            "PR #{} file listing stopped at the {}-page limit; {} files kept",
            proposal.number,
            self.max_pages,
            diffs.len()
        );
        Ok(diffs)
    }
}

/// Fixed listing, for wiring without a source-control API.
pub struct StaticFilesSource {
    diffs: Vec<DiffArtifact>,
}

impl StaticFilesSource {
    pub fn new(diffs: Vec<DiffArtifact>) -> Self {
        Self { diffs }
    }
}

#[async_trait]
impl ChangedFilesSource for StaticFilesSource {
    async fn list(&self, _proposal: &Proposal, _token: &str) -> Result<Vec<DiffArtifact>> {
        Ok(self.diffs.clone())
    }
}
