//! `release-stuck-claims` (spec §4.7/§6.4): the expired-only default mode
//! plus the `--force --worker-id`/`--force --all-active` emergency-recovery
//! modes. Non-default modes are gated by an explicit confirmation flag at
//! the caller (the CLI), per spec §4.7 — this module never prompts itself.

use crate::store::DomainRepository;
use crate::CoordinatorError;

/// Which claims a `release-stuck-claims` invocation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Default: only claims whose lease has already expired.
    ExpiredOnly,
    /// `--force --worker-id W`: every claim held by one worker, expired or not.
    ForceWorker(String),
    /// `--force --all-active`: every claim in the store, expired or not.
    ForceAll,
}

/// Outcome of a `release-stuck-claims` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub mode: ReleaseMode,
    pub released: u64,
    pub dry_run: bool,
}

/// Runs (or, if `dry_run`, only previews) a `release-stuck-claims` action.
pub async fn release_stuck_claims(
    repo: &dyn DomainRepository,
    mode: ReleaseMode,
    dry_run: bool,
) -> Result<ReleaseOutcome, CoordinatorError> {
    let released = match &mode {
        ReleaseMode::ExpiredOnly if dry_run => repo.count_expired_claims().await?,
        ReleaseMode::ExpiredOnly => repo.expire_stale_claims().await?,
        ReleaseMode::ForceWorker(worker) if dry_run => repo.count_claims_by_worker(worker).await?,
        ReleaseMode::ForceWorker(worker) => repo.force_release_by_worker(worker).await?,
        ReleaseMode::ForceAll if dry_run => repo.count_active_claims().await?,
        ReleaseMode::ForceAll => repo.force_release_all().await?,
    };

    Ok(ReleaseOutcome {
        mode,
        released,
        dry_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::DomainStatus;
    use crate::store::{BackfillStats, ClaimOutcome, DomainRecord, ReleaseOutcome as ClaimRelease, ReleaseUpdate, StatDeltas};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeRepo {
        expired: AtomicU64,
        by_worker: AtomicU64,
        all_active: AtomicU64,
        expire_calls: AtomicU64,
        force_worker_calls: AtomicU64,
        force_all_calls: AtomicU64,
    }

    #[async_trait]
    impl DomainRepository for FakeRepo {
        async fn upsert_domain(&self, _: &str, _: &str, _: Option<i64>) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn get_domain(&self, _: &str) -> crate::Result<Option<DomainRecord>> {
            unimplemented!()
        }
        async fn query_by_status(&self, _: Option<DomainStatus>, _: i64) -> crate::Result<Vec<DomainRecord>> {
            unimplemented!()
        }
        async fn count_by_status(&self, _: DomainStatus) -> crate::Result<u64> {
            unimplemented!()
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
            self.expire_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.expired.load(Ordering::SeqCst))
        }
        async fn force_release_by_worker(&self, _: &str) -> crate::Result<u64> {
            self.force_worker_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.by_worker.load(Ordering::SeqCst))
        }
        async fn force_release_all(&self) -> crate::Result<u64> {
            self.force_all_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.all_active.load(Ordering::SeqCst))
        }
        async fn reset_domain(&self, _: &str) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn count_expired_claims(&self) -> crate::Result<u64> {
            Ok(self.expired.load(Ordering::SeqCst))
        }
        async fn count_claims_by_worker(&self, _: &str) -> crate::Result<u64> {
            Ok(self.by_worker.load(Ordering::SeqCst))
        }
        async fn count_active_claims(&self) -> crate::Result<u64> {
            Ok(self.all_active.load(Ordering::SeqCst))
        }
        async fn count_non_terminal(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn backfill_upsert(&self, _: &str, _: &BackfillStats) -> crate::Result<()> {
            unimplemented!()
        }
        async fn set_images_stored(&self, _: &str, _: i64) -> crate::Result<bool> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn dry_run_never_mutates() {
        let repo = FakeRepo {
            expired: AtomicU64::new(3),
            ..Default::default()
        };
        let outcome = release_stuck_claims(&repo, ReleaseMode::ExpiredOnly, true)
            .await
            .unwrap();
        assert_eq!(outcome.released, 3);
        assert!(outcome.dry_run);
        assert_eq!(repo.expire_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_only_calls_expire_stale_claims() {
        let repo = FakeRepo {
            expired: AtomicU64::new(2),
            ..Default::default()
        };
        let outcome = release_stuck_claims(&repo, ReleaseMode::ExpiredOnly, false)
            .await
            .unwrap();
        assert_eq!(outcome.released, 2);
        assert_eq!(repo.expire_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_worker_targets_one_worker_only() {
        let repo = FakeRepo {
            by_worker: AtomicU64::new(2),
            all_active: AtomicU64::new(3),
            ..Default::default()
        };
        let outcome = release_stuck_claims(&repo, ReleaseMode::ForceWorker("host-1".to_string()), false)
            .await
            .unwrap();
        assert_eq!(outcome.released, 2);
        assert_eq!(repo.force_worker_calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.force_all_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn force_all_releases_every_active_claim() {
        let repo = FakeRepo {
            all_active: AtomicU64::new(5),
            ..Default::default()
        };
        let outcome = release_stuck_claims(&repo, ReleaseMode::ForceAll, false)
            .await
            .unwrap();
        assert_eq!(outcome.released, 5);
        assert_eq!(repo.force_all_calls.load(Ordering::SeqCst), 1);
    }
}
