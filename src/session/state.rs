//! In-process session state (spec §5 "shared resources"): `claimed_domains`,
//! `domain_stats`, and `domain_flushed_stats`, guarded by one mutex so the
//! heartbeat task and the crawl callback never race.

use crate::store::{CheckpointEntry, DomainRecord, StatDeltas};
use std::collections::HashMap;

/// Raw, monotonic-except-for-resets counters accumulated in memory during
/// one run. Kept separate from [`StatDeltas`], which is the wire shape for
/// a single flush or release (a delta, not a running total).
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainCounters {
    pub pages_discovered: i64,
    pub pages_crawled: i64,
    pub images_found: i64,
    pub images_stored: i64,
    pub total_error_count: i64,
    pub consecutive_error_count: i64,
}

impl DomainCounters {
    /// Records one fetched page's outcome. A successful page resets the
    /// consecutive-error streak; a failed one extends it (spec §3.1).
    pub fn record_page(&mut self, images_found: i64, images_stored: i64, errored: bool) {
        self.pages_crawled += 1;
        self.images_found += images_found;
        self.images_stored += images_stored;
        if errored {
            self.total_error_count += 1;
            self.consecutive_error_count += 1;
        } else {
            self.consecutive_error_count = 0;
        }
    }

    pub fn record_discovered(&mut self, count: i64) {
        self.pages_discovered += count;
    }

    /// Computes the delta that should be flushed given the last-flushed
    /// snapshot, per §4.3's "deltas are always stats - flushed, never
    /// negative" rule.
    pub fn delta_since(&self, flushed: &DomainCounters) -> StatDeltas {
        let consecutive_reset = self.consecutive_error_count < flushed.consecutive_error_count;
        StatDeltas {
            pages_discovered: (self.pages_discovered - flushed.pages_discovered).max(0),
            pages_crawled: (self.pages_crawled - flushed.pages_crawled).max(0),
            images_found: (self.images_found - flushed.images_found).max(0),
            images_stored: (self.images_stored - flushed.images_stored).max(0),
            total_error_count: (self.total_error_count - flushed.total_error_count).max(0),
            consecutive_error_count_reset: consecutive_reset,
            consecutive_error_count_delta: if consecutive_reset {
                0
            } else {
                (self.consecutive_error_count - flushed.consecutive_error_count).max(0)
            },
        }
    }
}

/// Everything the session tracks in memory for one claimed domain across
/// the lifetime of a run.
#[derive(Debug, Clone)]
pub struct ClaimedDomain {
    pub record: DomainRecord,
    pub counters: DomainCounters,
    pub flushed: DomainCounters,
    /// Links discovered past the per-domain budget, awaiting checkpointing
    /// at shutdown (spec §4.6 step 4).
    pub pending: Vec<CheckpointEntry>,
    pub blocked: Option<(String, String)>,
}

impl ClaimedDomain {
    pub fn new(record: DomainRecord) -> Self {
        ClaimedDomain {
            record,
            counters: DomainCounters::default(),
            flushed: DomainCounters::default(),
            pending: Vec::new(),
            blocked: None,
        }
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    /// Delta to apply at the next mid-run flush or at final release.
    pub fn unflushed_delta(&self) -> StatDeltas {
        self.counters.delta_since(&self.flushed)
    }

    pub fn mark_flushed(&mut self) {
        self.flushed = self.counters;
    }
}

/// The mutable state a worker session shares between its crawl callback and
/// its heartbeat task.
#[derive(Debug, Default)]
pub struct SessionState {
    pub claimed: HashMap<i64, ClaimedDomain>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            claimed: HashMap::new(),
        }
    }

    pub fn insert_claim(&mut self, record: DomainRecord) {
        self.claimed.insert(record.id, ClaimedDomain::new(record));
    }

    /// Drops a domain from the owned set, e.g. when a heartbeat renewal or
    /// a flush reports the claim as lost. No further work starts on it.
    pub fn drop_claim(&mut self, id: i64) {
        self.claimed.remove(&id);
    }

    pub fn owned_ids(&self) -> Vec<i64> {
        self.claimed.keys().copied().collect()
    }

    pub fn get(&self, id: i64) -> Option<&ClaimedDomain> {
        self.claimed.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut ClaimedDomain> {
        self.claimed.get_mut(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64) -> DomainRecord {
        DomainRecord {
            id,
            domain: format!("example-{id}.com"),
            status: "active".to_string(),
            version: 1,
            claimed_by: Some("host-1".to_string()),
            claim_expires_at: Some(Utc::now()),
            pages_discovered: 0,
            pages_crawled: 0,
            images_found: 0,
            images_stored: 0,
            total_error_count: 0,
            consecutive_error_count: 0,
            image_yield_rate: None,
            avg_images_per_page: None,
            error_rate: None,
            priority_score: 0,
            priority_computed_at: None,
            seed_rank: None,
            source: "seed".to_string(),
            frontier_checkpoint_id: None,
            frontier_size: 0,
            first_seen_at: Utc::now(),
            last_crawled_at: None,
            next_crawl_after: None,
            block_reason: None,
            block_reason_code: None,
            last_crawl_run_id: None,
        }
    }

    #[test]
    fn delta_since_never_goes_negative() {
        let mut counters = DomainCounters::default();
        counters.record_page(2, 1, false);
        let flushed = counters;
        // Nothing new happened; delta must be all zero, not negative.
        let delta = counters.delta_since(&flushed);
        assert_eq!(delta.pages_crawled, 0);
        assert_eq!(delta.images_found, 0);
    }

    #[test]
    fn consecutive_errors_reset_on_success() {
        let mut counters = DomainCounters::default();
        counters.record_page(0, 0, true);
        counters.record_page(0, 0, true);
        let flushed = DomainCounters::default();
        let delta = counters.delta_since(&flushed);
        assert!(!delta.consecutive_error_count_reset);
        assert_eq!(delta.consecutive_error_count_delta, 2);

        counters.record_page(1, 1, false);
        let delta = counters.delta_since(&flushed);
        assert!(delta.consecutive_error_count_reset);
    }

    #[test]
    fn claim_lifecycle() {
        let mut state = SessionState::new();
        state.insert_claim(record(1));
        assert_eq!(state.owned_ids(), vec![1]);
        state.drop_claim(1);
        assert!(state.get(1).is_none());
    }
}
