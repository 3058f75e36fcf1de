//! The domain repository (C3): upsert, claim, renew, release, incremental
//! stats, and status queries, all against the `domains` table. The claim
//! protocol's outcome types and release-retry mechanics live in
//! [`super::claims`]; this module wires them to the store.

use crate::domain::status::DomainStatus;
use crate::store::postgres::claims::{
    try_release_once, ClaimOutcome, ReleaseAttempt, ReleaseOutcome, ReleaseUpdate, StatDeltas,
};
use crate::store::postgres::pool::PgStore;
use crate::CoordinatorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// A domain record as stored relationally (spec §3.1).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DomainRecord {
    pub id: i64,
    pub domain: String,
    pub status: String,
    pub version: i64,
    pub claimed_by: Option<String>,
    pub claim_expires_at: Option<DateTime<Utc>>,
    pub pages_discovered: i64,
    pub pages_crawled: i64,
    pub images_found: i64,
    pub images_stored: i64,
    pub total_error_count: i64,
    pub consecutive_error_count: i64,
    pub image_yield_rate: Option<f64>,
    pub avg_images_per_page: Option<f64>,
    pub error_rate: Option<f64>,
    pub priority_score: i64,
    pub priority_computed_at: Option<DateTime<Utc>>,
    pub seed_rank: Option<i64>,
    pub source: String,
    pub frontier_checkpoint_id: Option<String>,
    pub frontier_size: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub next_crawl_after: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub block_reason_code: Option<String>,
    pub last_crawl_run_id: Option<Uuid>,
}

impl DomainRecord {
    /// Parses the stored status string; a row with an unrecognized status
    /// is a schema/constraint violation, not a caller error, so this panics
    /// rather than forcing every call site to handle an impossible `None`.
    pub fn status(&self) -> DomainStatus {
        DomainStatus::from_db_string(&self.status)
            .unwrap_or_else(|| panic!("domain row {} has unrecognized status {}", self.id, self.status))
    }
}

/// All relational operations over domain records (C3).
#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn upsert_domain(
        &self,
        domain: &str,
        source: &str,
        seed_rank: Option<i64>,
    ) -> Result<bool, CoordinatorError>;

    async fn get_domain(&self, domain: &str) -> Result<Option<DomainRecord>, CoordinatorError>;

    async fn query_by_status(
        &self,
        status: Option<DomainStatus>,
        limit: i64,
    ) -> Result<Vec<DomainRecord>, CoordinatorError>;

    /// Count of domains in each status, for the `domain-status` summary view
    /// (spec §6.4) without pulling every row into memory.
    async fn count_by_status(&self, status: DomainStatus) -> Result<u64, CoordinatorError>;

    async fn claim_batch(&self, worker: &str, batch_size: i64, lease_minutes: i64) -> ClaimOutcome;

    async fn renew_claim(
        &self,
        id: i64,
        worker: &str,
        lease_minutes: i64,
    ) -> Result<bool, CoordinatorError>;

    async fn release_claim(&self, update: ReleaseUpdate) -> ReleaseOutcome;

    async fn flush_stats(
        &self,
        id: i64,
        worker: &str,
        deltas: StatDeltas,
    ) -> Result<bool, CoordinatorError>;

    async fn expire_stale_claims(&self) -> Result<u64, CoordinatorError>;

    async fn force_release_by_worker(&self, worker: &str) -> Result<u64, CoordinatorError>;

    async fn force_release_all(&self) -> Result<u64, CoordinatorError>;

    async fn reset_domain(&self, domain: &str) -> Result<bool, CoordinatorError>;

    /// Count of claims an unforced `release-stuck-claims` run would clear
    /// (spec §6.4 `--dry-run`), without mutating anything.
    async fn count_expired_claims(&self) -> Result<u64, CoordinatorError>;

    /// Count of claims `--force --worker-id W` would clear.
    async fn count_claims_by_worker(&self, worker: &str) -> Result<u64, CoordinatorError>;

    /// Count of claims `--force --all-active` would clear.
    async fn count_active_claims(&self) -> Result<u64, CoordinatorError>;

    /// Count of rows a priority recompute would touch (spec §6.4 `--dry-run`).
    async fn count_non_terminal(&self) -> Result<u64, CoordinatorError>;

    /// Upserts aggregated historical stats for a canonical domain (spec
    /// §4.7 backfill, pass 1). Sets counters and status directly rather
    /// than by delta, so re-running backfill against the same log is a
    /// no-op (idempotent per spec §8.2 R3's upsert-idempotence spirit).
    async fn backfill_upsert(
        &self,
        domain: &str,
        stats: &BackfillStats,
    ) -> Result<(), CoordinatorError>;

    /// Sets `images_stored` directly from the image-provenance join (spec
    /// §4.7 backfill, pass 2). Returns `false` if the domain does not exist.
    async fn set_images_stored(&self, domain: &str, count: i64) -> Result<bool, CoordinatorError>;
}

/// Aggregated per-domain stats reconstituted from a historical per-page log
/// (spec §4.7 backfill, pass 1).
#[derive(Debug, Clone, Copy)]
pub struct BackfillStats {
    pub pages_discovered: i64,
    pub pages_crawled: i64,
    pub images_found: i64,
    pub total_error_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_crawled_at: DateTime<Utc>,
    pub status: DomainStatus,
}

/// Postgres-backed implementation of [`DomainRepository`].
pub struct PgDomainRepository {
    store: std::sync::Arc<PgStore>,
}

impl PgDomainRepository {
    pub fn new(store: std::sync::Arc<PgStore>) -> Self {
        PgDomainRepository { store }
    }

    async fn pool(&self) -> Result<&PgPool, CoordinatorError> {
        self.store.get_pool().await
    }
}

#[async_trait]
impl DomainRepository for PgDomainRepository {
    async fn upsert_domain(
        &self,
        domain: &str,
        source: &str,
        seed_rank: Option<i64>,
    ) -> Result<bool, CoordinatorError> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "INSERT INTO domains (domain, source, seed_rank) VALUES ($1, $2, $3) \
             ON CONFLICT (domain) DO NOTHING RETURNING id",
        )
        .bind(domain)
        .bind(source)
        .bind(seed_rank)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    }

    async fn get_domain(&self, domain: &str) -> Result<Option<DomainRecord>, CoordinatorError> {
        let pool = self.pool().await?;
        let record = sqlx::query_as::<_, DomainRecord>("SELECT * FROM domains WHERE domain = $1")
            .bind(domain)
            .fetch_optional(pool)
            .await?;
        Ok(record)
    }

    async fn query_by_status(
        &self,
        status: Option<DomainStatus>,
        limit: i64,
    ) -> Result<Vec<DomainRecord>, CoordinatorError> {
        let pool = self.pool().await?;
        let records = match status {
            Some(s) => {
                sqlx::query_as::<_, DomainRecord>(
                    "SELECT * FROM domains WHERE status = $1 \
                     ORDER BY priority_score DESC LIMIT $2",
                )
                .bind(s.to_db_string())
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DomainRecord>(
                    "SELECT * FROM domains ORDER BY priority_score DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
        };
        Ok(records)
    }

    async fn count_by_status(&self, status: DomainStatus) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM domains WHERE status = $1")
            .bind(status.to_db_string())
            .fetch_one(pool)
            .await?;
        Ok(count as u64)
    }

    async fn claim_batch(&self, worker: &str, batch_size: i64, lease_minutes: i64) -> ClaimOutcome {
        let pool = match self.pool().await {
            Ok(p) => p,
            Err(e) => return ClaimOutcome::StoreError(e.to_string()),
        };

        let mut tx = match pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return ClaimOutcome::StoreError(e.to_string()),
        };

        // Lock-and-skip primitive: never block on rows a concurrent claimer
        // already holds (spec 4.3).
        let ids: Vec<i64> = match sqlx::query_scalar(
            "SELECT id FROM domains \
             WHERE status IN ('pending', 'active') \
               AND (next_crawl_after IS NULL OR next_crawl_after <= now()) \
               AND (claimed_by IS NULL OR claim_expires_at < now()) \
             ORDER BY (status = 'active') DESC, priority_score DESC, last_crawled_at ASC NULLS FIRST \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        {
            Ok(ids) => ids,
            Err(e) => return ClaimOutcome::StoreError(e.to_string()),
        };

        if ids.is_empty() {
            let _ = tx.commit().await;
            return ClaimOutcome::NoneAvailable;
        }

        let rows = sqlx::query_as::<_, DomainRecord>(
            "UPDATE domains SET claimed_by = $1, \
             claim_expires_at = now() + make_interval(mins => $2::int), \
             version = version + 1 \
             WHERE id = ANY($3) \
             RETURNING *",
        )
        .bind(worker)
        .bind(lease_minutes as i32)
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => return ClaimOutcome::StoreError(e.to_string()),
        };

        if let Err(e) = tx.commit().await {
            return ClaimOutcome::StoreError(e.to_string());
        }

        ClaimOutcome::Acquired(rows)
    }

    async fn renew_claim(
        &self,
        id: i64,
        worker: &str,
        lease_minutes: i64,
    ) -> Result<bool, CoordinatorError> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE domains SET \
             claim_expires_at = now() + make_interval(mins => $3::int), \
             version = version + 1 \
             WHERE id = $1 AND claimed_by = $2 AND claim_expires_at > now()",
        )
        .bind(id)
        .bind(worker)
        .bind(lease_minutes as i32)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, update: ReleaseUpdate) -> ReleaseOutcome {
        let pool = match self.pool().await {
            Ok(p) => p,
            Err(e) => return ReleaseOutcome::StoreError(e.to_string()),
        };

        let mut expected_version = update.expected_version;
        for attempt in 0..3 {
            match try_release_once(pool, &update, expected_version).await {
                Ok(ReleaseAttempt::Released) => return ReleaseOutcome::Released,
                Ok(ReleaseAttempt::LostClaim) => return ReleaseOutcome::LostClaim,
                Ok(ReleaseAttempt::VersionConflict(current)) => {
                    expected_version = current;
                    if attempt == 2 {
                        return ReleaseOutcome::VersionConflict;
                    }
                }
                Err(e) => return ReleaseOutcome::StoreError(e.to_string()),
            }
        }
        ReleaseOutcome::VersionConflict
    }

    async fn flush_stats(
        &self,
        id: i64,
        worker: &str,
        deltas: StatDeltas,
    ) -> Result<bool, CoordinatorError> {
        let pool = self.pool().await?;
        let consecutive_error_sql = if deltas.consecutive_error_count_reset {
            "0"
        } else {
            "consecutive_error_count + $6"
        };
        let sql = format!(
            "UPDATE domains SET \
             pages_discovered = pages_discovered + $3, \
             pages_crawled = pages_crawled + $4, \
             images_found = images_found + $5, \
             images_stored = images_stored + $7, \
             total_error_count = total_error_count + $8, \
             consecutive_error_count = {consecutive_error_sql}, \
             last_crawled_at = now() \
             WHERE id = $1 AND claimed_by = $2"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(worker)
            .bind(deltas.pages_discovered)
            .bind(deltas.pages_crawled)
            .bind(deltas.images_found)
            .bind(deltas.consecutive_error_count_delta)
            .bind(deltas.images_stored)
            .bind(deltas.total_error_count)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_stale_claims(&self) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE domains SET claimed_by = NULL, claim_expires_at = NULL, version = version + 1 \
             WHERE claimed_by IS NOT NULL AND claim_expires_at < now()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn force_release_by_worker(&self, worker: &str) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE domains SET claimed_by = NULL, claim_expires_at = NULL, version = version + 1 \
             WHERE claimed_by = $1",
        )
        .bind(worker)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn force_release_all(&self) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE domains SET claimed_by = NULL, claim_expires_at = NULL, version = version + 1 \
             WHERE claimed_by IS NOT NULL",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reset_domain(&self, domain: &str) -> Result<bool, CoordinatorError> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE domains SET \
             status = 'pending', claimed_by = NULL, claim_expires_at = NULL, \
             pages_discovered = 0, pages_crawled = 0, images_found = 0, images_stored = 0, \
             total_error_count = 0, consecutive_error_count = 0, \
             frontier_checkpoint_id = NULL, frontier_size = 0, \
             block_reason = NULL, block_reason_code = NULL, \
             version = version + 1 \
             WHERE domain = $1",
        )
        .bind(domain)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_expired_claims(&self) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM domains WHERE claimed_by IS NOT NULL AND claim_expires_at < now()",
        )
        .fetch_one(pool)
        .await?;
        Ok(count as u64)
    }

    async fn count_claims_by_worker(&self, worker: &str) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM domains WHERE claimed_by = $1")
            .bind(worker)
            .fetch_one(pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_active_claims(&self) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM domains WHERE claimed_by IS NOT NULL")
                .fetch_one(pool)
                .await?;
        Ok(count as u64)
    }

    async fn count_non_terminal(&self) -> Result<u64, CoordinatorError> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM domains WHERE status NOT IN ('blocked', 'unreachable')",
        )
        .fetch_one(pool)
        .await?;
        Ok(count as u64)
    }

    async fn backfill_upsert(
        &self,
        domain: &str,
        stats: &BackfillStats,
    ) -> Result<(), CoordinatorError> {
        let pool = self.pool().await?;
        sqlx::query(
            "INSERT INTO domains ( \
                 domain, source, status, \
                 pages_discovered, pages_crawled, images_found, total_error_count, \
                 first_seen_at, last_crawled_at \
             ) VALUES ($1, 'backfill', $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (domain) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 pages_discovered = EXCLUDED.pages_discovered, \
                 pages_crawled = EXCLUDED.pages_crawled, \
                 images_found = EXCLUDED.images_found, \
                 total_error_count = EXCLUDED.total_error_count, \
                 first_seen_at = LEAST(domains.first_seen_at, EXCLUDED.first_seen_at), \
                 last_crawled_at = GREATEST(domains.last_crawled_at, EXCLUDED.last_crawled_at), \
                 version = domains.version + 1",
        )
        .bind(domain)
        .bind(stats.status.to_db_string())
        .bind(stats.pages_discovered)
        .bind(stats.pages_crawled)
        .bind(stats.images_found)
        .bind(stats.total_error_count)
        .bind(stats.first_seen_at)
        .bind(stats.last_crawled_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn set_images_stored(&self, domain: &str, count: i64) -> Result<bool, CoordinatorError> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE domains SET images_stored = $2, version = version + 1 WHERE domain = $1",
        )
        .bind(domain)
        .bind(count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_record_status_parses_valid_string() {
        let record = DomainRecord {
            id: 1,
            domain: "example.com".to_string(),
            status: "active".to_string(),
            version: 0,
            claimed_by: None,
            claim_expires_at: None,
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
        };
        assert_eq!(record.status(), DomainStatus::Active);
    }
}
