//! Beehive Core: configuration, error taxonomy and overlay metadata.

pub mod config;
pub mod error;
pub mod overlay;

pub use config::{BeehiveConfig, DataPaths};
pub use error::{Error, Result};
pub use overlay::{new_job_id, DiffArtifact, Overlay};
