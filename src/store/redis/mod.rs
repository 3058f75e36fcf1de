//! Key/value checkpoint store: a Redis-backed handle with the same
//! lazy-connect shape as [`super::postgres::pool::PgStore`].

pub mod checkpoint;

use crate::CoordinatorError;
use redis::aio::ConnectionManager;
use redis::Client;
use tokio::sync::OnceCell;

/// Process-wide handle to the Redis checkpoint store.
pub struct RedisStore {
    url: String,
    manager: OnceCell<ConnectionManager>,
}

impl RedisStore {
    pub fn new(url: impl Into<String>) -> Self {
        RedisStore {
            url: url.into(),
            manager: OnceCell::new(),
        }
    }

    /// Returns the connection manager, connecting on first call.
    /// `ConnectionManager` reconnects transparently on its own, so unlike
    /// the Postgres pool there is no retry loop here beyond the initial dial.
    pub async fn connection(&self) -> Result<ConnectionManager, CoordinatorError> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let client = Client::open(self.url.as_str())
                    .map_err(|e| CoordinatorError::StoreUnavailable(e.to_string()))?;
                client
                    .get_connection_manager()
                    .await
                    .map_err(CoordinatorError::from)
            })
            .await?;
        Ok(manager.clone())
    }

    /// Cheap liveness probe, mirroring `PgStore::health_check`.
    pub async fn health_check(&self) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
