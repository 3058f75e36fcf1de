//! Crawl run bookkeeping (spec §3.3): short-lived per-process records used
//! for operator reporting and the stale-run cleanup action.

use crate::store::postgres::pool::PgStore;
use crate::CoordinatorError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Mirrors the teacher's `RunStatus` pattern: a closed enum with a
/// DB string round-trip, used for the `crawl_runs.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<RunStatus> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// A crawl run's mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    Discovery,
    Refresh,
}

impl CrawlMode {
    pub fn to_db_string(self) -> &'static str {
        match self {
            CrawlMode::Discovery => "discovery",
            CrawlMode::Refresh => "refresh",
        }
    }

    pub fn from_db_string(s: &str) -> Option<CrawlMode> {
        match s {
            "discovery" => Some(CrawlMode::Discovery),
            "refresh" => Some(CrawlMode::Refresh),
            _ => None,
        }
    }
}

/// A crawl run record (spec §3.3).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRecord {
    pub id: Uuid,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub pages_crawled: i64,
    pub images_found: i64,
    pub images_downloaded: i64,
    pub seed_source: Option<String>,
    pub error_message: Option<String>,
    pub last_activity_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn status(&self) -> RunStatus {
        RunStatus::from_db_string(&self.status)
            .unwrap_or_else(|| panic!("run {} has unrecognized status {}", self.id, self.status))
    }
}

/// Creates a new run record in `running` status.
pub async fn create_run(
    store: &PgStore,
    id: Uuid,
    mode: CrawlMode,
    seed_source: Option<&str>,
) -> Result<(), CoordinatorError> {
    let pool = store.get_pool().await?;
    sqlx::query("INSERT INTO crawl_runs (id, mode, seed_source) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(mode.to_db_string())
        .bind(seed_source)
        .execute(pool)
        .await?;
    Ok(())
}

/// Updates a run's progress counters and bumps `last_activity_at`, so the
/// stale-run cleanup action can tell a live run from an abandoned one.
pub async fn record_activity(
    store: &PgStore,
    id: Uuid,
    pages_crawled: i64,
    images_found: i64,
) -> Result<(), CoordinatorError> {
    let pool = store.get_pool().await?;
    sqlx::query(
        "UPDATE crawl_runs SET pages_crawled = $2, images_found = $3, last_activity_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(pages_crawled)
    .bind(images_found)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks a run `completed`, recording the final `images_downloaded` count
/// computed from the authoritative per-page log (spec §4.6 step 7).
pub async fn mark_completed(
    store: &PgStore,
    id: Uuid,
    images_downloaded: i64,
) -> Result<(), CoordinatorError> {
    let pool = store.get_pool().await?;
    sqlx::query(
        "UPDATE crawl_runs SET status = 'completed', completed_at = now(), \
         images_downloaded = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(images_downloaded)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks a run `failed` with an explanatory message.
pub async fn mark_failed(store: &PgStore, id: Uuid, error_message: &str) -> Result<(), CoordinatorError> {
    let pool = store.get_pool().await?;
    sqlx::query(
        "UPDATE crawl_runs SET status = 'failed', completed_at = now(), error_message = $2 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Finds runs still `running` whose last activity predates `threshold` and
/// marks them `failed` (spec §4.7 "cleanup stale runs"). Returns the count.
pub async fn cleanup_stale_runs(
    store: &PgStore,
    older_than: chrono::Duration,
) -> Result<u64, CoordinatorError> {
    let pool = store.get_pool().await?;
    let cutoff = Utc::now() - older_than;
    let result = sqlx::query(
        "UPDATE crawl_runs SET status = 'failed', completed_at = now(), \
         error_message = 'stale: no activity before cutoff' \
         WHERE status = 'running' AND last_activity_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Counts runs `cleanup_stale_runs` would mark failed, without mutating
/// anything (spec §6.4 `cleanup-stale-runs --dry-run`).
pub async fn count_stale_runs(
    store: &PgStore,
    older_than: chrono::Duration,
) -> Result<u64, CoordinatorError> {
    let pool = store.get_pool().await?;
    let cutoff = Utc::now() - older_than;
    let count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM crawl_runs WHERE status = 'running' AND last_activity_at < $1",
    )
    .bind(cutoff)
    .fetch_one(pool)
    .await?;
    Ok(count as u64)
}

pub async fn get_run(store: &PgStore, id: Uuid) -> Result<Option<RunRecord>, CoordinatorError> {
    let pool = store.get_pool().await?;
    let record = sqlx::query_as::<_, RunRecord>("SELECT * FROM crawl_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}
