//! crawl-coordinator: the distributed scheduling core of a multi-worker
//! image-discovery crawler.
//!
//! This crate owns domain selection, dedup, claim leasing, frontier
//! checkpointing, and priority scoring. It does not fetch pages, parse HTML,
//! or store images — those are external collaborators this crate depends on
//! only through the [`session::engine::CrawlEngine`] trait contract.

pub mod config;
pub mod domain;
pub mod operator;
pub mod session;
pub mod store;

use thiserror::Error;

/// Top-level error type for coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("claim lost for domain {domain} (worker {worker})")]
    ClaimLost { domain: String, worker: String },

    #[error("version conflict releasing domain {domain} after {attempts} attempts")]
    VersionConflict { domain: String, attempts: u32 },

    #[error("illegal status transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: domain::status::DomainStatus,
        to: domain::status::DomainStatus,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("claim protocol requires smart scheduling to be enabled")]
    FatalConfig,

    #[error("relational store error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("key/value store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid environment variable {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("claim protocol requires smart scheduling to be enabled")]
    ClaimWithoutSmartScheduling,
}

/// Domain-canonicalization errors.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CanonError {
    #[error("empty domain input")]
    Empty,

    #[error("could not parse host from input: {0}")]
    Unparseable(String),

    #[error("IDNA encoding failed for {0}")]
    Idna(String),
}

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for canonicalization operations.
pub type CanonResult<T> = std::result::Result<T, CanonError>;

pub use config::Config;
pub use domain::status::DomainStatus;
