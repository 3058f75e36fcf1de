use chrono::NaiveDate;
use serde::Deserialize;

/// Root configuration tree for the coordinator.
///
/// Mirrors the teacher's top-level `Config` shape (one struct per concern,
/// kebab-case TOML keys), regrouped around scheduling/claim/priority/
/// checkpoint/store concerns instead of crawler/output/quality ones.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scheduling: SchedulingConfig,
    pub claim: ClaimConfig,
    pub priority: PriorityConfig,
    pub checkpoint: CheckpointConfig,
    pub stores: StoresConfig,
}

/// Top-level feature gates and per-domain budget knobs (spec §6.4).
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// Select domains from the priority-ordered store rather than a seed file.
    #[serde(rename = "enable-smart-scheduling", default = "default_true")]
    pub enable_smart_scheduling: bool,

    /// Use the atomic claim/renew/release protocol. Requires smart scheduling.
    #[serde(rename = "enable-claim-protocol", default = "default_true")]
    pub enable_claim_protocol: bool,

    /// Enforce `max_pages_per_run` as a hard per-domain budget.
    #[serde(rename = "enable-per-domain-budget", default = "default_true")]
    pub enable_per_domain_budget: bool,

    /// Maximum pages crawled per domain per run; 0 means unlimited.
    #[serde(rename = "max-pages-per-run", default = "default_max_pages_per_run")]
    pub max_pages_per_run: u32,

    /// Pages between mid-run stat flushes; 0 disables mid-run flushing.
    #[serde(rename = "domain-stats-flush-interval", default = "default_flush_interval")]
    pub domain_stats_flush_interval: u32,

    /// Reduce canonical domains to their registrable (public-suffix + 1) form.
    #[serde(rename = "canonicalization-strip-subdomains", default)]
    pub canonicalization_strip_subdomains: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_pages_per_run() -> u32 {
    1_000
}

fn default_flush_interval() -> u32 {
    100
}

/// Claim-protocol timing (spec §4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimConfig {
    /// Domains requested per `claim_batch` call.
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Lease duration in minutes before a claim is reclaimable.
    #[serde(rename = "lease-minutes", default = "default_lease_minutes")]
    pub lease_minutes: i64,

    /// Heartbeat renewal interval in minutes.
    #[serde(rename = "renewal-interval-minutes", default = "default_renewal_minutes")]
    pub renewal_interval_minutes: i64,
}

fn default_batch_size() -> u32 {
    10
}

fn default_lease_minutes() -> i64 {
    30
}

fn default_renewal_minutes() -> i64 {
    10
}

/// Priority-scoring knobs (spec §4.4, and §9's staleness-epoch open question).
#[derive(Debug, Clone, Deserialize)]
pub struct PriorityConfig {
    /// Epoch used in place of a null `last_crawled_at` when computing staleness.
    /// Resolves spec §9's open question in favor of making this configurable
    /// rather than hard-coding the source's `2000-01-01`.
    #[serde(rename = "never-crawled-epoch", default = "default_never_crawled_epoch")]
    pub never_crawled_epoch: NaiveDate,
}

fn default_never_crawled_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).expect("2000-01-01 is a valid date")
}

/// Frontier checkpoint knobs (spec §4.5).
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// Checkpoint TTL in days.
    #[serde(rename = "ttl-days", default = "default_checkpoint_ttl_days")]
    pub ttl_days: i64,
}

fn default_checkpoint_ttl_days() -> i64 {
    30
}

/// Store connection settings (spec §6.4's connection-URL env vars).
#[derive(Debug, Clone, Deserialize)]
pub struct StoresConfig {
    #[serde(rename = "postgres-url")]
    pub postgres_url: String,

    #[serde(rename = "redis-url")]
    pub redis_url: String,

    #[serde(rename = "min-connections", default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(rename = "max-connections", default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}
