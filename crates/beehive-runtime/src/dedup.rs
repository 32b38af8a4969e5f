//! Delivery deduplication keyed by (proposal number, head commit).
//!
//! A repeated trigger for the same proposal update inside the TTL collapses
//! into the run that claimed the key first. Claims live in process memory
//! only; a restart forgets them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Another run holds the key; carries that run's job id.
    Duplicate { job_id: String },
}

struct Claim {
    job_id: String,
    claimed_at: Instant,
}

pub struct DeliveryDedup {
    ttl: Duration,
    claims: Mutex<HashMap<(u64, String), Claim>>,
}

impl DeliveryDedup {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub fn claim(&self, proposal_number: u64, head_commit: &str, job_id: &str) -> ClaimOutcome {
        let mut claims = self.claims.lock();
        let ttl = self.ttl;
        claims.retain(|_, claim| claim.claimed_at.elapsed() < ttl);

        let key = (proposal_number, head_commit.to_string());
        if let Some(existing) = claims.get(&key) {
            debug!(
                "Duplicate delivery for #{}@{} collapsed into {}",
                proposal_number, head_commit, existing.job_id
            );
            return ClaimOutcome::Duplicate {
                job_id: existing.job_id.clone(),
            };
        }

        claims.insert(
            key,
            Claim {
                job_id: job_id.to_string(),
                claimed_at: Instant::now(),
            },
        );
        ClaimOutcome::Claimed
    }

    /// Drop the claim, but only if `job_id` still owns it.
    pub fn release(&self, proposal_number: u64, head_commit: &str, job_id: &str) {
        let mut claims = self.claims.lock();
        let key = (proposal_number, head_commit.to_string());
        if claims.get(&key).is_some_and(|c| c.job_id == job_id) {
            claims.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.claims.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
