//! `backfill-domains` (spec §4.7): reconstitutes domain rows from a
//! historical per-page log. Two passes:
//!
//! 1. Canonicalize every logged page's raw domain string, aggregate
//!    `pages_discovered`/`pages_crawled`/`images_found`/`total_error_count`/
//!    `first_seen_at`/`last_crawled_at` per canonical domain, and upsert —
//!    so pre-canonicalization variants (`WWW.Example.com`, `example.com.`)
//!    fold into the same row (spec §4.7).
//! 2. Recompute `images_stored` per canonical domain from the authoritative
//!    image-provenance join (spec §9's open question: this crate makes the
//!    provenance join the sole source of truth for `images_stored` in a
//!    backfill, never derived from the per-page log's error/image counts).
//!
//! Both the page log and the provenance join are external collaborators out
//! of this crate's scope (§1); they are modeled as traits so callers can
//! supply a real log reader and tests can supply an in-memory fake.

use crate::domain::{canonicalize, CanonicalizeOptions};
use crate::domain::status::DomainStatus;
use crate::store::{BackfillStats, DomainRepository};
use crate::CoordinatorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One row from the historical per-page log (spec §4.7).
#[derive(Debug, Clone)]
pub struct HistoricalPageRecord {
    /// Domain string as logged, before canonicalization.
    pub raw_domain: String,
    pub occurred_at: DateTime<Utc>,
    pub images_found: i64,
    pub errored: bool,
}

/// The authoritative historical per-page log (spec §4.7 pass 1).
#[async_trait]
pub trait HistoricalPageLog: Send + Sync {
    async fn pages(&self) -> Result<Vec<HistoricalPageRecord>, CoordinatorError>;
}

/// The authoritative image-provenance join (spec §4.7 pass 2, §9's open
/// question resolved: this is the sole source of truth for `images_stored`
/// during a backfill).
#[async_trait]
pub trait ImageProvenanceLog: Send + Sync {
    /// Distinct images stored per *canonical* domain.
    async fn distinct_image_counts(&self) -> Result<HashMap<String, i64>, CoordinatorError>;
}

/// Outcome of one `backfill-domains` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackfillOutcome {
    pub domains_upserted: u64,
    pub provenance_updated: u64,
    pub dry_run: bool,
}

/// Runs (or, if `dry_run`, only previews) the two-pass backfill.
pub async fn backfill_domains(
    repo: &dyn DomainRepository,
    page_log: &dyn HistoricalPageLog,
    provenance: &dyn ImageProvenanceLog,
    canon_opts: CanonicalizeOptions,
    dry_run: bool,
) -> Result<BackfillOutcome, CoordinatorError> {
    let aggregated = aggregate_by_canonical_domain(page_log.pages().await?, canon_opts)?;

    if dry_run {
        return Ok(BackfillOutcome {
            domains_upserted: aggregated.len() as u64,
            provenance_updated: 0,
            dry_run: true,
        });
    }

    let mut domains_upserted = 0_u64;
    for (domain, stats) in &aggregated {
        repo.backfill_upsert(domain, stats).await?;
        domains_upserted += 1;
    }

    let mut provenance_updated = 0_u64;
    for (domain, count) in provenance.distinct_image_counts().await? {
        if repo.set_images_stored(&domain, count).await? {
            provenance_updated += 1;
        }
    }

    Ok(BackfillOutcome {
        domains_upserted,
        provenance_updated,
        dry_run: false,
    })
}

/// Canonicalizes each logged page's raw domain and folds matching rows into
/// one [`BackfillStats`] per canonical domain (spec §4.7's "runs
/// canonicalization on raw domain strings before aggregation").
fn aggregate_by_canonical_domain(
    pages: Vec<HistoricalPageRecord>,
    canon_opts: CanonicalizeOptions,
) -> Result<HashMap<String, BackfillStats>, CoordinatorError> {
    struct Accumulator {
        pages_crawled: i64,
        images_found: i64,
        total_error_count: i64,
        first_seen_at: DateTime<Utc>,
        last_crawled_at: DateTime<Utc>,
    }

    let mut accum: HashMap<String, Accumulator> = HashMap::new();

    for page in pages {
        let domain = canonicalize(&page.raw_domain, canon_opts)
            .map_err(|e| CoordinatorError::InvalidInput(e.to_string()))?;

        accum
            .entry(domain)
            .and_modify(|a| {
                a.pages_crawled += 1;
                a.images_found += page.images_found;
                a.total_error_count += i64::from(page.errored);
                a.first_seen_at = a.first_seen_at.min(page.occurred_at);
                a.last_crawled_at = a.last_crawled_at.max(page.occurred_at);
            })
            .or_insert(Accumulator {
                pages_crawled: 1,
                images_found: page.images_found,
                total_error_count: i64::from(page.errored),
                first_seen_at: page.occurred_at,
                last_crawled_at: page.occurred_at,
            });
    }

    Ok(accum
        .into_iter()
        .map(|(domain, a)| {
            let error_rate = a.total_error_count as f64 / a.pages_crawled as f64;
            let status = if error_rate > 0.5 {
                DomainStatus::Blocked
            } else {
                DomainStatus::Exhausted
            };
            (
                domain,
                BackfillStats {
                    // The log records crawled pages only; backfill has no
                    // visibility into links discovered but never fetched,
                    // so pages_discovered == pages_crawled here.
                    pages_discovered: a.pages_crawled,
                    pages_crawled: a.pages_crawled,
                    images_found: a.images_found,
                    total_error_count: a.total_error_count,
                    first_seen_at: a.first_seen_at,
                    last_crawled_at: a.last_crawled_at,
                    status,
                },
            )
        })
        .collect())
}
