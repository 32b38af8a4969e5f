//! Runtime: the change-proposal orchestrator and the broadcast fanout.
//!
//! The orchestrator sequences ritual calls for one proposal update, enforces
//! the coherence gate and writes the outcome into the mutation log. The
//! fanout delivers a final outcome to every configured channel, isolating
//! per-channel failure.

pub mod broadcast;
pub mod dedup;
pub mod files;
pub mod labels;
pub mod orchestrator;
pub mod outputs;
pub mod trigger;

pub use broadcast::{
    BroadcastFanout, BroadcastReport, BroadcastRequest, ChannelName, ChannelResult, ChannelStatus,
    ChatWebhookChannel, DeliveryChannel, SnippetChannel,
};
pub use dedup::{ClaimOutcome, DeliveryDedup};
pub use files::{ChangedFilesSource, GitHubFilesSource, StaticFilesSource};
pub use labels::{classify, LabelReport};
pub use orchestrator::{Orchestrator, Phase, ReviewOutcome};
pub use outputs::{CoherenceVerdict, RiskAssessment, RiskLevel, RitualOutputs, TodoSuggestions};
pub use trigger::{parse_trigger, Proposal, Trigger};
