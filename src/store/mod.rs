//! External store collaborators: the relational domain/run store (Postgres)
//! and the key/value checkpoint store (Redis).

pub mod postgres;
pub mod redis;

pub use postgres::claims::{ClaimOutcome, ReleaseOutcome, ReleaseUpdate, StatDeltas};
pub use postgres::domains::{BackfillStats, DomainRecord, DomainRepository, PgDomainRepository};
pub use postgres::pool::{PgStore, PgStoreConfig};
pub use postgres::runs::{CrawlMode, RunRecord, RunStatus};
pub use redis::checkpoint::{CheckpointEntry, CheckpointStore, RedisCheckpointStore};
pub use redis::RedisStore;
