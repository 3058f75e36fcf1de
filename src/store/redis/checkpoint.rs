//! Frontier checkpoint storage (spec §4.5/§6.3): Redis sorted sets keyed by
//! `frontier:<domain>:<run-id>`, URL as member and crawl depth as score so a
//! resumed crawl walks the frontier back out in BFS order.
//!
//! Grounded in the original `storage/frontier_checkpoint.py`: same key
//! scheme, same TTL-on-save behavior, same checkpoint id format.

use crate::store::redis::RedisStore;
use crate::CoordinatorError;
use async_trait::async_trait;
use redis::AsyncCommands;

/// One frontier URL awaiting resume, with its BFS depth.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointEntry {
    pub url: String,
    pub depth: i64,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(
        &self,
        checkpoint_id: &str,
        entries: &[CheckpointEntry],
        ttl_seconds: i64,
    ) -> Result<(), CoordinatorError>;

    async fn load(&self, checkpoint_id: &str) -> Result<Vec<CheckpointEntry>, CoordinatorError>;

    async fn delete(&self, checkpoint_id: &str) -> Result<bool, CoordinatorError>;

    async fn exists(&self, checkpoint_id: &str) -> Result<bool, CoordinatorError>;

    async fn size(&self, checkpoint_id: &str) -> Result<u64, CoordinatorError>;
}

/// Builds the canonical checkpoint id for a domain/run pair.
pub fn checkpoint_id(domain: &str, run_id: &str) -> String {
    format!("{domain}:{run_id}")
}

fn frontier_key(checkpoint_id: &str) -> String {
    format!("frontier:{checkpoint_id}")
}

pub struct RedisCheckpointStore {
    store: std::sync::Arc<RedisStore>,
}

impl RedisCheckpointStore {
    pub fn new(store: std::sync::Arc<RedisStore>) -> Self {
        RedisCheckpointStore { store }
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn save(
        &self,
        checkpoint_id: &str,
        entries: &[CheckpointEntry],
        ttl_seconds: i64,
    ) -> Result<(), CoordinatorError> {
        if entries.is_empty() {
            return Ok(());
        }
        let key = frontier_key(checkpoint_id);
        let mut conn = self.store.connection().await?;

        let members: Vec<(i64, String)> = entries
            .iter()
            .map(|e| (e.depth, e.url.clone()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zadd_multiple(&key, &members).ignore();
        pipe.expire(&key, ttl_seconds).ignore();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Vec<CheckpointEntry>, CoordinatorError> {
        let key = frontier_key(checkpoint_id);
        let mut conn = self.store.connection().await?;
        let members: Vec<(String, i64)> = conn.zrange_withscores(&key, 0, -1).await?;
        Ok(members
            .into_iter()
            .map(|(url, depth)| CheckpointEntry { url, depth })
            .collect())
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool, CoordinatorError> {
        let key = frontier_key(checkpoint_id);
        let mut conn = self.store.connection().await?;
        let removed: i64 = conn.del(&key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, checkpoint_id: &str) -> Result<bool, CoordinatorError> {
        let key = frontier_key(checkpoint_id);
        let mut conn = self.store.connection().await?;
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }

    async fn size(&self, checkpoint_id: &str) -> Result<u64, CoordinatorError> {
        let key = frontier_key(checkpoint_id);
        let mut conn = self.store.connection().await?;
        let size: u64 = conn.zcard(&key).await?;
        Ok(size)
    }
}
