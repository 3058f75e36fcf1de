//! Claim protocol types (spec §4.3): the explicit outcome enums spec §9
//! asks for in place of exception-driven control flow, plus the
//! release-retry helper shared by [`super::domains::PgDomainRepository`].

use crate::domain::status::DomainStatus;
use crate::store::postgres::domains::DomainRecord;
use crate::CoordinatorError;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

/// Per-counter deltas applied by a flush or a release (spec §4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatDeltas {
    pub pages_discovered: i64,
    pub pages_crawled: i64,
    pub images_found: i64,
    pub images_stored: i64,
    pub total_error_count: i64,
    /// When set, `consecutive_error_count` is reset to 0 instead of bumped.
    pub consecutive_error_count_reset: bool,
    /// Added to `consecutive_error_count` when not reset.
    pub consecutive_error_count_delta: i64,
}

/// Everything a worker supplies when releasing a claim (spec §4.3 step 3).
#[derive(Debug, Clone)]
pub struct ReleaseUpdate {
    pub id: i64,
    pub worker: String,
    pub expected_version: i64,
    pub deltas: StatDeltas,
    pub new_status: Option<DomainStatus>,
    /// `Some(None)` clears the checkpoint reference; `None` leaves it as-is.
    pub frontier_checkpoint_id: Option<Option<String>>,
    pub frontier_size: Option<i64>,
    pub last_crawl_run_id: Option<Uuid>,
    pub block_reason: Option<(String, String)>,
}

/// Outcome of a claim attempt (spec §9's explicit-result redesign).
pub enum ClaimOutcome {
    Acquired(Vec<DomainRecord>),
    NoneAvailable,
    StoreError(String),
}

/// Outcome of a release attempt (spec §9's explicit-result redesign).
#[derive(Debug, PartialEq)]
pub enum ReleaseOutcome {
    Released,
    VersionConflict,
    LostClaim,
    StoreError(String),
}

pub(super) enum ReleaseAttempt {
    Released,
    LostClaim,
    VersionConflict(i64),
}

/// Runs one release attempt inside its own transaction: re-reads the row
/// under `FOR UPDATE`, checks ownership and the expected version, validates
/// any requested status transition against §4.2, then applies deltas and
/// clears the claim. Callers retry on `VersionConflict` with the refreshed
/// version, per §4.3's "retry up to 3 times" policy.
pub(super) async fn try_release_once(
    pool: &PgPool,
    update: &ReleaseUpdate,
    expected_version: i64,
) -> Result<ReleaseAttempt, CoordinatorError> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    let row = sqlx::query("SELECT version, claimed_by, status FROM domains WHERE id = $1 FOR UPDATE")
        .bind(update.id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(row) = row else {
        return Ok(ReleaseAttempt::LostClaim);
    };

    let current_version: i64 = row.try_get("version")?;
    let claimed_by: Option<String> = row.try_get("claimed_by")?;
    let current_status_str: String = row.try_get("status")?;

    if claimed_by.as_deref() != Some(update.worker.as_str()) {
        return Ok(ReleaseAttempt::LostClaim);
    }

    if current_version != expected_version {
        return Ok(ReleaseAttempt::VersionConflict(current_version));
    }

    if let Some(new_status) = update.new_status {
        let current_status = DomainStatus::from_db_string(&current_status_str).ok_or_else(|| {
            CoordinatorError::StoreUnavailable(format!(
                "unrecognized status {current_status_str} on domain {}",
                update.id
            ))
        })?;
        if !current_status.can_transition_to(new_status) {
            return Err(CoordinatorError::IllegalTransition {
                from: current_status,
                to: new_status,
            });
        }
    }

    let new_status_str = update.new_status.map(|s| s.to_db_string());
    let consecutive_error_sql = if update.deltas.consecutive_error_count_reset {
        "0"
    } else {
        "consecutive_error_count + $14"
    };

    let sql = format!(
        "UPDATE domains SET \
         claimed_by = NULL, claim_expires_at = NULL, \
         pages_discovered = pages_discovered + $2, \
         pages_crawled = pages_crawled + $3, \
         images_found = images_found + $4, \
         images_stored = images_stored + $5, \
         total_error_count = total_error_count + $6, \
         consecutive_error_count = {consecutive_error_sql}, \
         status = COALESCE($7, status), \
         frontier_checkpoint_id = CASE WHEN $8 THEN $9 ELSE frontier_checkpoint_id END, \
         frontier_size = COALESCE($10, frontier_size), \
         last_crawl_run_id = COALESCE($11, last_crawl_run_id), \
         block_reason = COALESCE($12, block_reason), \
         block_reason_code = COALESCE($13, block_reason_code), \
         last_crawled_at = now(), \
         version = version + 1 \
         WHERE id = $1"
    );

    sqlx::query(&sql)
        .bind(update.id)
        .bind(update.deltas.pages_discovered)
        .bind(update.deltas.pages_crawled)
        .bind(update.deltas.images_found)
        .bind(update.deltas.images_stored)
        .bind(update.deltas.total_error_count)
        .bind(new_status_str)
        .bind(update.frontier_checkpoint_id.is_some())
        .bind(update.frontier_checkpoint_id.clone().flatten())
        .bind(update.frontier_size)
        .bind(update.last_crawl_run_id)
        .bind(update.block_reason.as_ref().map(|(r, _)| r.clone()))
        .bind(update.block_reason.as_ref().map(|(_, c)| c.clone()))
        .bind(update.deltas.consecutive_error_count_delta)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(ReleaseAttempt::Released)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_update_clone_preserves_fields() {
        let update = ReleaseUpdate {
            id: 1,
            worker: "host-123".to_string(),
            expected_version: 4,
            deltas: StatDeltas {
                pages_crawled: 5,
                ..Default::default()
            },
            new_status: Some(DomainStatus::Exhausted),
            frontier_checkpoint_id: Some(None),
            frontier_size: Some(0),
            last_crawl_run_id: None,
            block_reason: None,
        };
        let cloned = update.clone();
        assert_eq!(cloned.worker, "host-123");
        assert_eq!(cloned.deltas.pages_crawled, 5);
        assert_eq!(cloned.new_status, Some(DomainStatus::Exhausted));
    }
}
