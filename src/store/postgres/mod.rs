//! The relational store: domain records, the claim protocol, priority
//! recomputation, and crawl run bookkeeping, all against Postgres.

pub mod claims;
pub mod domains;
pub mod pool;
pub mod priority;
pub mod runs;
