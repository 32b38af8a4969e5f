//! Beehive Store: namespaced JSON documents and the append-only mutation log.
//!
//! Every namespace holds two logical keys: a bounded `history` list and a
//! single `current` document. The two are written independently (history
//! first), so a reader may briefly see a `current` that is newer than the
//! tail of `history`. Readers never cross-check the two.

pub mod blob;
pub mod mutation_log;
pub mod sqlite;

pub use blob::{read_json, write_json, BlobStore, MemoryBlobStore, CURRENT_KEY, HISTORY_KEY};
pub use mutation_log::{CurrentPointer, MutationLog, MutationRecord, MutationStatus};
pub use sqlite::SqliteBlobStore;
