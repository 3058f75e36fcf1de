//! Lazily-initialized Postgres connection pool with bounded retry/backoff.
//!
//! Shape follows the teacher's pattern for the one process-wide handle a
//! service initializes at startup and tears down on shutdown (spec §9):
//! a config struct, a handle wrapping a `OnceCell<PgPool>`, and a retry loop
//! with exponential backoff plus jitter on the initial connect.

use crate::config::StoresConfig;
use crate::CoordinatorError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;

/// Connection and retry settings for the relational store.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_backoff_ms: u64,
    /// Connect during `init()` rather than on first use.
    pub eager_init: bool,
    /// Run `sqlx::migrate!` before serving any query.
    pub migrate_on_start: bool,
}

impl PgStoreConfig {
    /// Builds pool settings from the validated application config, filling
    /// in retry/lifetime defaults the TOML schema doesn't expose.
    pub fn from_stores_config(stores: &StoresConfig) -> Self {
        PgStoreConfig {
            database_url: stores.postgres_url.clone(),
            min_connections: stores.min_connections,
            max_connections: stores.max_connections,
            connect_timeout_secs: 10,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            retry_max_attempts: 5,
            retry_base_backoff_ms: 200,
            eager_init: false,
            migrate_on_start: true,
        }
    }
}

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Process-wide handle to the relational store's connection pool.
pub struct PgStore {
    cfg: PgStoreConfig,
    pool: OnceCell<PgPool>,
    migrated: OnceCell<()>,
}

impl PgStore {
    pub fn new(cfg: PgStoreConfig) -> Self {
        PgStore {
            cfg,
            pool: OnceCell::new(),
            migrated: OnceCell::new(),
        }
    }

    /// Connects (and optionally migrates) eagerly if configured to do so.
    /// Safe to call more than once; subsequent calls are no-ops.
    pub async fn init(&self) -> Result<(), CoordinatorError> {
        if self.cfg.eager_init {
            self.get_pool().await?;
        }
        Ok(())
    }

    /// Returns the pool, connecting with retry on first call.
    pub async fn get_pool(&self) -> Result<&PgPool, CoordinatorError> {
        let pool = self
            .pool
            .get_or_try_init(|| self.try_connect_with_retry())
            .await?;

        if self.cfg.migrate_on_start {
            self.ensure_migrated(pool).await?;
        }

        Ok(pool)
    }

    async fn ensure_migrated(&self, pool: &PgPool) -> Result<(), CoordinatorError> {
        self.migrated
            .get_or_try_init(|| async {
                MIGRATOR
                    .run(pool)
                    .await
                    .map_err(|e| CoordinatorError::StoreUnavailable(e.to_string()))
            })
            .await?;
        Ok(())
    }

    fn build_pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.cfg.min_connections)
            .max_connections(self.cfg.max_connections)
            .acquire_timeout(Duration::from_secs(self.cfg.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.cfg.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.cfg.max_lifetime_secs))
    }

    async fn try_connect_with_retry(&self) -> Result<PgPool, CoordinatorError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let connect = self.build_pool_options().connect(&self.cfg.database_url);
            match timeout(Duration::from_secs(self.cfg.connect_timeout_secs), connect).await {
                Ok(Ok(pool)) => return Ok(pool),
                Ok(Err(e)) if attempt >= self.cfg.retry_max_attempts => {
                    return Err(CoordinatorError::StoreUnavailable(e.to_string()))
                }
                Err(_) if attempt >= self.cfg.retry_max_attempts => {
                    return Err(CoordinatorError::StoreUnavailable(
                        "connect timed out".to_string(),
                    ))
                }
                _ => {
                    let backoff_ms = compute_backoff_ms(self.cfg.retry_base_backoff_ms, attempt);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    /// Cheap liveness probe, bounded by a 1s timeout.
    pub async fn health_check(&self) -> bool {
        let Ok(pool) = self.get_pool().await else {
            return false;
        };
        timeout(Duration::from_secs(1), sqlx::query("SELECT 1").execute(pool))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

fn compute_backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(10));
    let jitter = fastrand::u64(0..=exp / 4 + 1);
    exp + jitter
}
