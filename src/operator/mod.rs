//! Operator actions (C6): out-of-band interventions run against the
//! domain/run stores — releasing stuck claims, cleaning up abandoned runs,
//! recomputing priorities, resetting a domain, and backfilling from a
//! historical log (spec §4.7). None of this runs inside a worker session;
//! it is the CLI-facing surface (§6.4) an operator drives by hand.

mod backfill;
mod release;

pub use backfill::{backfill_domains, BackfillOutcome, HistoricalPageLog, HistoricalPageRecord, ImageProvenanceLog};
pub use release::{release_stuck_claims, ReleaseMode, ReleaseOutcome};

use crate::config::PriorityConfig;
use crate::domain::status::DomainStatus;
use crate::store::postgres::{priority, runs};
use crate::store::{DomainRecord, DomainRepository, PgStore};
use crate::CoordinatorError;
use chrono::Duration;

/// Outcome of `cleanup-stale-runs` (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub failed: u64,
    pub dry_run: bool,
}

/// Marks (or, if `dry_run`, only counts) `running` crawl runs whose last
/// activity predates `older_than` as `failed`.
pub async fn cleanup_stale_runs(
    store: &PgStore,
    older_than: Duration,
    dry_run: bool,
) -> Result<CleanupOutcome, CoordinatorError> {
    if dry_run {
        let failed = runs::count_stale_runs(store, older_than).await?;
        return Ok(CleanupOutcome {
            failed,
            dry_run: true,
        });
    }
    let failed = runs::cleanup_stale_runs(store, older_than).await?;
    Ok(CleanupOutcome {
        failed,
        dry_run: false,
    })
}

/// Outcome of `recalculate-priorities` (spec §4.4/§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalculateOutcome {
    pub touched: u64,
    pub dry_run: bool,
}

/// Recomputes (or, if `dry_run`, only counts eligible rows for) every
/// non-terminal domain's derived signals and priority score.
pub async fn recalculate_priorities(
    store: &PgStore,
    repo: &dyn DomainRepository,
    config: &PriorityConfig,
    dry_run: bool,
) -> Result<RecalculateOutcome, CoordinatorError> {
    if dry_run {
        let touched = repo.count_non_terminal().await?;
        return Ok(RecalculateOutcome {
            touched,
            dry_run: true,
        });
    }
    let touched = priority::recalculate_priorities(store, config).await?;
    Ok(RecalculateOutcome {
        touched,
        dry_run: false,
    })
}

/// Zeroes a domain's counters and returns it to `pending` (spec §4.7).
/// `force` only matters at the CLI boundary (bypassing interactive
/// confirmation); the reset itself is unconditional once called.
pub async fn reset_domain(repo: &dyn DomainRepository, domain: &str) -> Result<bool, CoordinatorError> {
    repo.reset_domain(domain).await
}

/// One row of the `domain-status` summary view (spec §6.4, no `--status` filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSummary {
    pub status: DomainStatus,
    pub count: u64,
}

/// Counts domains per status, in state-machine order (spec §6.4 `domain-status`
/// with no `--status` filter).
pub async fn domain_status_summary(
    repo: &dyn DomainRepository,
) -> Result<Vec<StatusSummary>, CoordinatorError> {
    let mut summary = Vec::with_capacity(DomainStatus::all().len());
    for &status in DomainStatus::all() {
        let count = repo.count_by_status(status).await?;
        summary.push(StatusSummary { status, count });
    }
    Ok(summary)
}

/// Lists up to `limit` domains, optionally filtered by status, for
/// `domain-status --status S --limit N` (spec §6.4).
pub async fn domain_status_list(
    repo: &dyn DomainRepository,
    status: Option<DomainStatus>,
    limit: i64,
) -> Result<Vec<DomainRecord>, CoordinatorError> {
    repo.query_by_status(status, limit).await
}

/// Full record dump for `domain-info <domain>` (spec §6.4).
pub async fn domain_info(
    repo: &dyn DomainRepository,
    domain: &str,
) -> Result<Option<DomainRecord>, CoordinatorError> {
    repo.get_domain(domain).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BackfillStats, ClaimOutcome, ReleaseOutcome as ClaimRelease, ReleaseUpdate, StatDeltas};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRepo {
        by_status: Mutex<std::collections::HashMap<&'static str, u64>>,
        reset_calls: Mutex<Vec<String>>,
        non_terminal: u64,
    }

    #[async_trait]
    impl DomainRepository for FakeRepo {
        async fn upsert_domain(&self, _: &str, _: &str, _: Option<i64>) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn get_domain(&self, _: &str) -> crate::Result<Option<DomainRecord>> {
            Ok(None)
        }
        async fn query_by_status(&self, _: Option<DomainStatus>, _: i64) -> crate::Result<Vec<DomainRecord>> {
            Ok(vec![])
        }
        async fn count_by_status(&self, status: DomainStatus) -> crate::Result<u64> {
            Ok(*self
                .by_status
                .lock()
                .unwrap()
                .get(status.to_db_string())
                .unwrap_or(&0))
        }
        async fn claim_batch(&self, _: &str, _: i64, _: i64) -> ClaimOutcome {
            unimplemented!()
        }
        async fn renew_claim(&self, _: i64, _: &str, _: i64) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn release_claim(&self, _: ReleaseUpdate) -> ClaimRelease {
            unimplemented!()
        }
        async fn flush_stats(&self, _: i64, _: &str, _: StatDeltas) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn expire_stale_claims(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn force_release_by_worker(&self, _: &str) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn force_release_all(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn reset_domain(&self, domain: &str) -> crate::Result<bool> {
            self.reset_calls.lock().unwrap().push(domain.to_string());
            Ok(true)
        }
        async fn count_expired_claims(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn count_claims_by_worker(&self, _: &str) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn count_active_claims(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn count_non_terminal(&self) -> crate::Result<u64> {
            Ok(self.non_terminal)
        }
        async fn backfill_upsert(&self, _: &str, _: &BackfillStats) -> crate::Result<()> {
            unimplemented!()
        }
        async fn set_images_stored(&self, _: &str, _: i64) -> crate::Result<bool> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn status_summary_covers_every_status_in_order() {
        let mut by_status = std::collections::HashMap::new();
        by_status.insert("pending", 4);
        by_status.insert("active", 2);
        let repo = FakeRepo {
            by_status: Mutex::new(by_status),
            ..Default::default()
        };

        let summary = domain_status_summary(&repo).await.unwrap();
        assert_eq!(summary.len(), 5);
        assert_eq!(summary[0].status, DomainStatus::Pending);
        assert_eq!(summary[0].count, 4);
        assert_eq!(summary[1].status, DomainStatus::Active);
        assert_eq!(summary[1].count, 2);
        assert_eq!(summary[2].count, 0);
    }

    #[tokio::test]
    async fn reset_domain_delegates_to_repository() {
        let repo = FakeRepo::default();
        let result = reset_domain(&repo, "example.com").await.unwrap();
        assert!(result);
        assert_eq!(repo.reset_calls.lock().unwrap().as_slice(), ["example.com"]);
    }
}
