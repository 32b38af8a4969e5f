//! Rituals: remote operations invoked by the orchestrator.
//!
//! Provides the HTTP invocation client, the invocation record protocol
//! (pending → running → completed | failed) and the in-memory ledger that
//! records every transition and annotation as an ordered event.

pub mod client;
pub mod invocation;
pub mod ledger;

pub use client::{HttpRitualClient, InvokeOptions, RitualInvoker, RitualResponse};
pub use invocation::{InvocationRecord, InvocationStatus, Metadata};
pub use ledger::{LedgerEntry, LedgerError, LedgerEvent, RitualLedger};
