//! crawl-coordinator operator CLI entry point.
//!
//! This binary is the out-of-band surface (spec §6.4) an operator drives by
//! hand against the relational store: releasing stuck claims, cleaning up
//! abandoned runs, recomputing priorities, resetting or inspecting a domain,
//! and backfilling domain rows from a historical log. It never drives a
//! crawl itself — that is [`crawl_coordinator::session::WorkerSession`], an
//! external process's responsibility built on this crate as a library.

use clap::{Parser, Subcommand};
use crawl_coordinator::config::load_config_with_hash;
use crawl_coordinator::domain::{CanonicalizeOptions, DomainStatus};
use crawl_coordinator::operator::{
    backfill_domains, cleanup_stale_runs, domain_info, domain_status_list, domain_status_summary,
    recalculate_priorities, release_stuck_claims, reset_domain, HistoricalPageLog, HistoricalPageRecord,
    ImageProvenanceLog, ReleaseMode,
};
use crawl_coordinator::store::{DomainRepository, PgDomainRepository, PgStore, PgStoreConfig};
use crawl_coordinator::CoordinatorError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "coordinator")]
#[command(about = "Operator actions for the distributed crawl coordinator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Release claims whose lease has expired, or force-release a subset (spec §4.7/§6.4).
    ReleaseStuckClaims {
        #[arg(long)]
        dry_run: bool,

        /// Bypass the expired-only default and target claims regardless of lease state.
        #[arg(long)]
        force: bool,

        #[arg(long, conflicts_with = "all_active")]
        worker_id: Option<String>,

        #[arg(long)]
        all_active: bool,
    },

    /// Mark abandoned `running` crawl runs as `failed` (spec §4.7/§6.4).
    CleanupStaleRuns {
        #[arg(long, default_value_t = 60)]
        older_than_minutes: i64,

        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute every non-terminal domain's derived signals and priority score (spec §4.4/§6.4).
    RecalculatePriorities {
        #[arg(long)]
        dry_run: bool,
    },

    /// Zero a domain's counters and return it to `pending` (spec §4.7/§6.4).
    DomainReset {
        domain: String,

        /// Required to actually apply the reset; omitting it only reports what would happen.
        #[arg(long)]
        force: bool,
    },

    /// Show a per-status summary, or list domains filtered by status (spec §6.4).
    DomainStatus {
        #[arg(long, value_parser = parse_status)]
        status: Option<DomainStatus>,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Full record dump for one domain (spec §6.4).
    DomainInfo { domain: String },

    /// Reconstitute domain rows from a historical per-page log (spec §4.7/§6.4).
    BackfillDomains {
        #[arg(long)]
        dry_run: bool,

        /// Path to a `domain,rfc3339_timestamp,images_found,errored` CSV log.
        /// Omitted entirely, the pass runs against an empty log.
        #[arg(long)]
        page_log: Option<PathBuf>,

        /// Path to a `domain,count` CSV of authoritative distinct-image counts.
        #[arg(long)]
        provenance_log: Option<PathBuf>,
    },
}

fn parse_status(s: &str) -> Result<DomainStatus, String> {
    DomainStatus::from_db_string(s).ok_or_else(|| format!("unrecognized domain status: {s}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("loading configuration from {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)?;
    tracing::info!(hash = %config_hash, "configuration loaded");

    let pg_config = PgStoreConfig::from_stores_config(&config.stores);
    let store = Arc::new(PgStore::new(pg_config));
    let repo: Arc<dyn DomainRepository> = Arc::new(PgDomainRepository::new(store.clone()));

    let result = run_command(cli.command, &config, &store, repo.as_ref()).await;

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            std::process::exit(1);
        }
    }
}

async fn run_command(
    command: Command,
    config: &crawl_coordinator::Config,
    store: &Arc<PgStore>,
    repo: &dyn DomainRepository,
) -> Result<(), CoordinatorError> {
    match command {
        Command::ReleaseStuckClaims {
            dry_run,
            force,
            worker_id,
            all_active,
        } => {
            let mode = match (force, worker_id, all_active) {
                (false, _, _) => ReleaseMode::ExpiredOnly,
                (true, Some(worker), _) => ReleaseMode::ForceWorker(worker),
                (true, None, true) => ReleaseMode::ForceAll,
                (true, None, false) => {
                    return Err(CoordinatorError::InvalidInput(
                        "--force requires --worker-id or --all-active".to_string(),
                    ))
                }
            };
            let outcome = release_stuck_claims(repo, mode, dry_run).await?;
            println!(
                "{}{} claim(s) for mode {:?}",
                if outcome.dry_run { "would release " } else { "released " },
                outcome.released,
                outcome.mode,
            );
            Ok(())
        }

        Command::CleanupStaleRuns {
            older_than_minutes,
            dry_run,
        } => {
            let outcome =
                cleanup_stale_runs(store, chrono::Duration::minutes(older_than_minutes), dry_run).await?;
            println!(
                "{}{} stale run(s) failed",
                if outcome.dry_run { "would mark " } else { "marked " },
                outcome.failed,
            );
            Ok(())
        }

        Command::RecalculatePriorities { dry_run } => {
            let outcome = recalculate_priorities(store, repo, &config.priority, dry_run).await?;
            println!(
                "{}{} domain(s) touched",
                if outcome.dry_run { "would recalculate " } else { "recalculated " },
                outcome.touched,
            );
            Ok(())
        }

        Command::DomainReset { domain, force } => {
            if !force {
                println!("would reset {domain} to pending; pass --force to apply");
                return Ok(());
            }
            let existed = reset_domain(repo, &domain).await?;
            if existed {
                println!("reset {domain} to pending");
            } else {
                println!("{domain} not found");
            }
            Ok(())
        }

        Command::DomainStatus { status, limit } => {
            if let Some(status) = status {
                let domains = domain_status_list(repo, Some(status), limit).await?;
                for d in &domains {
                    println!("{}\t{}\tpriority={}\tcrawled={}", d.id, d.domain, d.priority_score, d.pages_crawled);
                }
                println!("{} domain(s) with status {status}", domains.len());
            } else {
                let summary = domain_status_summary(repo).await?;
                for row in summary {
                    println!("{}\t{}", row.status, row.count);
                }
            }
            Ok(())
        }

        Command::DomainInfo { domain } => {
            match domain_info(repo, &domain).await? {
                Some(d) => {
                    println!("domain:               {}", d.domain);
                    println!("status:               {}", d.status());
                    println!("version:              {}", d.version);
                    println!("claimed_by:           {:?}", d.claimed_by);
                    println!("claim_expires_at:     {:?}", d.claim_expires_at);
                    println!("pages_discovered:     {}", d.pages_discovered);
                    println!("pages_crawled:        {}", d.pages_crawled);
                    println!("images_found:         {}", d.images_found);
                    println!("images_stored:        {}", d.images_stored);
                    println!("total_error_count:    {}", d.total_error_count);
                    println!("consecutive_errors:   {}", d.consecutive_error_count);
                    println!("priority_score:       {}", d.priority_score);
                    println!("frontier_checkpoint:  {:?}", d.frontier_checkpoint_id);
                    println!("frontier_size:        {}", d.frontier_size);
                    println!("first_seen_at:        {}", d.first_seen_at);
                    println!("last_crawled_at:      {:?}", d.last_crawled_at);
                    println!("block_reason:         {:?}", d.block_reason);
                }
                None => println!("{domain} not found"),
            }
            Ok(())
        }

        Command::BackfillDomains {
            dry_run,
            page_log,
            provenance_log,
        } => {
            let log = FileHistoricalPageLog::open(page_log.as_deref())?;
            let provenance = FileImageProvenanceLog::open(provenance_log.as_deref())?;
            let canon_opts = CanonicalizeOptions {
                strip_subdomains: config.scheduling.canonicalization_strip_subdomains,
            };
            let outcome = backfill_domains(repo, &log, &provenance, canon_opts, dry_run).await?;
            println!(
                "{}{} domain(s), {} provenance update(s)",
                if outcome.dry_run { "would upsert " } else { "upserted " },
                outcome.domains_upserted,
                outcome.provenance_updated,
            );
            Ok(())
        }
    }
}

/// Reads a historical per-page log from a simple
/// `domain,rfc3339_timestamp,images_found,errored` CSV. An absent path is
/// treated as an empty log, so `backfill-domains` can be run before a real
/// log source is wired in without erroring.
struct FileHistoricalPageLog {
    records: Vec<HistoricalPageRecord>,
}

impl FileHistoricalPageLog {
    fn open(path: Option<&Path>) -> Result<Self, CoordinatorError> {
        let Some(path) = path else {
            return Ok(FileHistoricalPageLog { records: Vec::new() });
        };
        let content = std::fs::read_to_string(path)?;
        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            let [raw_domain, occurred_at, images_found, errored] = fields.as_slice() else {
                return Err(CoordinatorError::InvalidInput(format!(
                    "page log line {}: expected 4 comma-separated fields",
                    lineno + 1
                )));
            };
            records.push(HistoricalPageRecord {
                raw_domain: raw_domain.to_string(),
                occurred_at: occurred_at
                    .parse()
                    .map_err(|e| CoordinatorError::InvalidInput(format!("page log line {}: {e}", lineno + 1)))?,
                images_found: images_found
                    .parse()
                    .map_err(|e| CoordinatorError::InvalidInput(format!("page log line {}: {e}", lineno + 1)))?,
                errored: errored == "1",
            });
        }
        Ok(FileHistoricalPageLog { records })
    }
}

#[async_trait::async_trait]
impl HistoricalPageLog for FileHistoricalPageLog {
    async fn pages(&self) -> Result<Vec<HistoricalPageRecord>, CoordinatorError> {
        Ok(self.records.clone())
    }
}

/// Reads authoritative distinct-image counts per canonical domain from a
/// `domain,count` CSV. An absent path means no provenance data available.
struct FileImageProvenanceLog {
    counts: HashMap<String, i64>,
}

impl FileImageProvenanceLog {
    fn open(path: Option<&Path>) -> Result<Self, CoordinatorError> {
        let Some(path) = path else {
            return Ok(FileImageProvenanceLog { counts: HashMap::new() });
        };
        let content = std::fs::read_to_string(path)?;
        let mut counts = HashMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((domain, count)) = line.split_once(',') else {
                return Err(CoordinatorError::InvalidInput(format!(
                    "provenance log line {}: expected `domain,count`",
                    lineno + 1
                )));
            };
            let count: i64 = count
                .parse()
                .map_err(|e| CoordinatorError::InvalidInput(format!("provenance log line {}: {e}", lineno + 1)))?;
            counts.insert(domain.to_string(), count);
        }
        Ok(FileImageProvenanceLog { counts })
    }
}

#[async_trait::async_trait]
impl ImageProvenanceLog for FileImageProvenanceLog {
    async fn distinct_image_counts(&self) -> Result<HashMap<String, i64>, CoordinatorError> {
        Ok(self.counts.clone())
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level, mirroring
/// the teacher's `setup_logging`.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_coordinator=info,warn"),
            1 => EnvFilter::new("crawl_coordinator=debug,info"),
            2 => EnvFilter::new("crawl_coordinator=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
