//! Deploy status tracking for an external build/deploy pipeline.
//!
//! Status strings from upstream emitters are normalized into a fixed
//! vocabulary, persisted as a "current" snapshot plus a bounded per-job
//! history, and rendered as badges.

pub mod badge;
pub mod pipeline;
pub mod retry;
pub mod status;
pub mod tracker;

pub use badge::{deploy_badge, ritual_badge, Badge};
pub use pipeline::{DeployOutcome, DeployPipeline, DeployRequest, HookResult};
pub use retry::{post_with_retry, HookReceipt, RetryPolicy};
pub use status::{normalize_status, DeployEcho, DeploySnapshot, DeployStatus};
pub use tracker::DeployTracker;
