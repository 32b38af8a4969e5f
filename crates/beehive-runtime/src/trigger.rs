//! Inbound trigger parsing.
//!
//! Triggers are validated once at the boundary. Actions other than
//! `opened`/`synchronize` are acknowledged and ignored; a reviewable action
//! with a missing or malformed proposal is rejected as invalid input.

use serde::{Deserialize, Serialize};

use beehive_core::{Error, Result};

const REVIEW_ACTIONS: [&str; 2] = ["opened", "synchronize"];
const UNKNOWN_AUTHOR: &str = "Unknown Steward";

/// The change proposal a trigger refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_url: Option<String>,
    #[serde(default = "unknown_author")]
    pub author: String,
    pub head_commit: String,
}

fn unknown_author() -> String {
    UNKNOWN_AUTHOR.to_string()
}

impl Proposal {
    /// Actor identity presented to every ritual on behalf of the proposal's author.
    pub fn actor(&self) -> String {
        format!("Worker Bee for @{}", self.author)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Acknowledged without running the pipeline.
    Ignored { action: String },
    Review { action: String, proposal: Proposal },
}

#[derive(Deserialize)]
struct RawTrigger {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    proposal: Option<serde_json::Value>,
}

/// Parse and validate a trigger body.
pub fn parse_trigger(body: &serde_json::Value) -> Result<Trigger> {
    let raw: RawTrigger = serde_json::from_value(body.clone())
        .map_err(|e| Error::InvalidInput(format!("Invalid trigger payload: {}", e)))?;

    let action = raw.action.unwrap_or_default();
    if !REVIEW_ACTIONS.contains(&action.as_str()) {
        return Ok(Trigger::Ignored { action });
    }

    let proposal = raw
        .proposal
        .ok_or_else(|| Error::InvalidInput("Trigger is missing the proposal".into()))?;
    let mut proposal: Proposal = serde_json::from_value(proposal)
        .map_err(|e| Error::InvalidInput(format!("Invalid proposal: {}", e)))?;

    if proposal.number == 0 {
        return Err(Error::InvalidInput("Proposal number must be positive".into()));
    }
    proposal.head_commit = proposal.head_commit.trim().to_string();
    if proposal.head_commit.is_empty() {
        return Err(Error::InvalidInput("Proposal head commit is empty".into()));
    }
    if proposal.author.trim().is_empty() {
        proposal.author = unknown_author();
    }

    Ok(Trigger::Review { action, proposal })
}
