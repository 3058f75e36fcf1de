//! Worker session (C5): the run-time object a single worker process holds
//! for the lifetime of one invocation — claim, seed, crawl, flush, renew,
//! release (spec §4.6).

pub mod engine;
pub mod heartbeat;
pub mod state;

pub use engine::{CrawlEngine, CrawlRequest, CrawlResponse, PageParser};
pub use state::{ClaimedDomain, DomainCounters, SessionState};

use crate::config::Config;
use crate::domain::status::DomainStatus;
use crate::store::postgres::runs;
use crate::store::{
    CheckpointEntry, CheckpointStore, ClaimOutcome, DomainRepository, PgStore, ReleaseOutcome,
    ReleaseUpdate,
};
use crate::CoordinatorError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Builds the `host-pid` worker id convention (spec §4.6 step 1).
pub fn generate_worker_id() -> String {
    let host = hostname_or_unknown();
    format!("{host}-{}", std::process::id())
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

/// A single worker process's run-time object.
pub struct WorkerSession {
    worker_id: String,
    run_id: Uuid,
    config: Config,
    repo: Arc<dyn DomainRepository>,
    checkpoints: Arc<dyn CheckpointStore>,
    run_store: Arc<PgStore>,
    engine: Arc<dyn CrawlEngine>,
    state: Arc<Mutex<SessionState>>,
}

impl WorkerSession {
    pub fn new(
        config: Config,
        repo: Arc<dyn DomainRepository>,
        checkpoints: Arc<dyn CheckpointStore>,
        run_store: Arc<PgStore>,
        engine: Arc<dyn CrawlEngine>,
    ) -> Self {
        WorkerSession {
            worker_id: generate_worker_id(),
            run_id: Uuid::new_v4(),
            config,
            repo,
            checkpoints,
            run_store,
            engine,
            state: Arc::new(Mutex::new(SessionState::new())),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Drives the full session lifecycle (spec §4.6 steps 1-7). Returns
    /// `Ok(())` whether or not any domain was claimed; claiming nothing
    /// ends the session without error.
    pub async fn run(&self, seed_source: Option<&str>) -> Result<(), CoordinatorError> {
        if self.config.scheduling.enable_claim_protocol
            && !self.config.scheduling.enable_smart_scheduling
        {
            return Err(CoordinatorError::FatalConfig);
        }

        runs::create_run(
            &self.run_store,
            self.run_id,
            runs::CrawlMode::Discovery,
            seed_source,
        )
        .await?;

        let outcome = self
            .repo
            .claim_batch(
                &self.worker_id,
                self.config.claim.batch_size as i64,
                self.config.claim.lease_minutes,
            )
            .await;

        let claimed = match outcome {
            ClaimOutcome::Acquired(rows) => rows,
            ClaimOutcome::NoneAvailable => {
                tracing::info!(worker = %self.worker_id, "no claimable domains; ending session");
                runs::mark_completed(&self.run_store, self.run_id, 0).await?;
                return Ok(());
            }
            ClaimOutcome::StoreError(e) => {
                runs::mark_failed(&self.run_store, self.run_id, &e).await?;
                return Err(CoordinatorError::StoreUnavailable(e));
            }
        };

        let mut seeds = Vec::new();
        {
            let mut guard = self.state.lock().await;
            for record in claimed {
                let domain = record.domain.clone();
                let checkpoint_ref = record.frontier_checkpoint_id.clone();
                guard.insert_claim(record);

                if let Some(checkpoint_id) = checkpoint_ref {
                    match self.checkpoints.load(&checkpoint_id).await {
                        Ok(entries) => {
                            seeds.extend(entries.into_iter().map(|e| CrawlRequest {
                                url: e.url,
                                domain: domain.clone(),
                                depth: e.depth,
                            }));
                        }
                        Err(e) => tracing::warn!(
                            domain = %domain, error = %e, "failed to load frontier checkpoint"
                        ),
                    }
                } else {
                    seeds.push(CrawlRequest {
                        url: format!("https://{domain}"),
                        domain,
                        depth: 0,
                    });
                }
            }
        }

        let heartbeat_handle = heartbeat::spawn(
            self.worker_id.clone(),
            self.config.claim.lease_minutes,
            Duration::from_secs((self.config.claim.renewal_interval_minutes * 60) as u64),
            self.repo.clone(),
            self.state.clone(),
        );

        let callback = SessionCallback {
            config: self.config.clone(),
            repo: self.repo.clone(),
            worker_id: self.worker_id.clone(),
            state: self.state.clone(),
        };
        self.engine.run(seeds, &callback).await;

        heartbeat_handle.abort();

        let (images_downloaded, clean) = self.shutdown().await;
        if clean {
            runs::mark_completed(&self.run_store, self.run_id, images_downloaded).await?;
        } else {
            runs::mark_failed(&self.run_store, self.run_id, "one or more domains failed to release cleanly").await?;
        }
        Ok(())
    }

    /// Releases every owned domain with its final status and stats (spec
    /// §4.6 step 7). Returns the run's total `images_downloaded` and
    /// whether every release succeeded cleanly.
    async fn shutdown(&self) -> (i64, bool) {
        let ids = self.state.lock().await.owned_ids();
        let mut images_downloaded = 0_i64;
        let mut clean = true;

        for id in ids {
            let domain = {
                let guard = self.state.lock().await;
                guard.get(id).cloned()
            };
            let Some(domain) = domain else { continue };
            images_downloaded += domain.counters.images_stored;

            let new_status = if domain.blocked.is_some() {
                DomainStatus::Blocked
            } else if !domain.pending.is_empty() {
                DomainStatus::Active
            } else {
                DomainStatus::Exhausted
            };

            let frontier = if new_status == DomainStatus::Active && !domain.pending.is_empty() {
                let checkpoint_id =
                    crate::store::redis::checkpoint::checkpoint_id(&domain.record.domain, &self.run_id.to_string());
                match self
                    .checkpoints
                    .save(&checkpoint_id, &domain.pending, self.config.checkpoint.ttl_days * 86_400)
                    .await
                {
                    Ok(()) => Some((Some(checkpoint_id), domain.pending.len() as i64)),
                    Err(e) => {
                        tracing::warn!(domain = %domain.record.domain, error = %e, "failed to save checkpoint");
                        None
                    }
                }
            } else {
                Some((None, 0))
            };

            let update = ReleaseUpdate {
                id,
                worker: self.worker_id.clone(),
                expected_version: domain.record.version,
                deltas: domain.unflushed_delta(),
                new_status: Some(new_status),
                frontier_checkpoint_id: frontier.as_ref().map(|(cp, _)| cp.clone()),
                frontier_size: frontier.as_ref().map(|(_, size)| *size),
                last_crawl_run_id: Some(self.run_id),
                block_reason: domain.blocked.clone(),
            };

            match self.repo.release_claim(update).await {
                ReleaseOutcome::Released => {}
                ReleaseOutcome::VersionConflict | ReleaseOutcome::LostClaim => {
                    tracing::warn!(domain = %domain.record.domain, "release could not complete; leaving for stale reclamation");
                    clean = false;
                }
                ReleaseOutcome::StoreError(e) => {
                    tracing::error!(domain = %domain.record.domain, error = %e, "release failed");
                    clean = false;
                }
            }
        }

        (images_downloaded, clean)
    }
}

/// The callback object the engine invokes per fetched page (spec §6.1).
struct SessionCallback {
    config: Config,
    repo: Arc<dyn DomainRepository>,
    worker_id: String,
    state: Arc<Mutex<SessionState>>,
}

#[async_trait::async_trait]
impl PageParser for SessionCallback {
    async fn on_page(&self, response: CrawlResponse) -> Vec<CrawlRequest> {
        let flush_interval = self.config.scheduling.domain_stats_flush_interval as i64;
        let max_pages = self.config.scheduling.max_pages_per_run as i64;
        let per_domain_budget = self.config.scheduling.enable_per_domain_budget;

        let mut guard = self.state.lock().await;
        let Some(claimed) = guard.claimed.values_mut().find(|c| c.record.domain == response.domain)
        else {
            return Vec::new();
        };

        let errored = response.error.is_some() || response.status >= 400;
        claimed.counters.record_page(
            response.images_found as i64,
            response.images_stored as i64,
            errored,
        );

        let budget_remaining = !per_domain_budget
            || max_pages == 0
            || claimed.counters.pages_crawled < max_pages;

        // Discovered links always grow the frontier total (§4.4's "remaining
        // frontier" term counts checkpointed links too), but only
        // within-budget ones are handed back to the engine to fetch now;
        // the rest are checkpointed for a future run.
        claimed.counters.record_discovered(response.discovered.len() as i64);
        let to_enqueue = if budget_remaining {
            response.discovered
        } else {
            for link in response.discovered {
                claimed.pending.push(CheckpointEntry {
                    url: link.url,
                    depth: link.depth,
                });
            }
            Vec::new()
        };

        let id = claimed.id();
        let due_for_flush = flush_interval > 0
            && (claimed.counters.pages_crawled - claimed.flushed.pages_crawled) >= flush_interval;

        if due_for_flush {
            let delta = claimed.unflushed_delta();
            drop(guard);
            match self.repo.flush_stats(id, &self.worker_id, delta).await {
                Ok(true) => {
                    if let Some(c) = self.state.lock().await.get_mut(id) {
                        c.mark_flushed();
                    }
                }
                Ok(false) => {
                    tracing::warn!(domain_id = id, "flush found claim lost; dropping domain");
                    self.state.lock().await.drop_claim(id);
                }
                Err(e) => {
                    tracing::warn!(domain_id = id, error = %e, "flush failed; retained in memory for next attempt");
                }
            }
        }

        to_enqueue
    }

    async fn closed(&self, reason: &str) {
        tracing::info!(reason, "crawl engine closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CheckpointConfig, ClaimConfig, PriorityConfig, SchedulingConfig, StoresConfig,
    };
    use crate::domain::status::DomainStatus as Status;
    use crate::session::engine::test_support::ScriptedEngine;
    use crate::store::DomainRecord;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn worker_id_has_pid_suffix() {
        let id = generate_worker_id();
        assert!(id.ends_with(&std::process::id().to_string()));
    }

    struct NoFlushRepo;

    #[async_trait]
    impl DomainRepository for NoFlushRepo {
        async fn upsert_domain(&self, _: &str, _: &str, _: Option<i64>) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn get_domain(&self, _: &str) -> crate::Result<Option<DomainRecord>> {
            unimplemented!()
        }
        async fn query_by_status(&self, _: Option<Status>, _: i64) -> crate::Result<Vec<DomainRecord>> {
            unimplemented!()
        }
        async fn count_by_status(&self, _: Status) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn claim_batch(&self, _: &str, _: i64, _: i64) -> ClaimOutcome {
            unimplemented!()
        }
        async fn renew_claim(&self, _: i64, _: &str, _: i64) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn release_claim(&self, _: ReleaseUpdate) -> ReleaseOutcome {
            unimplemented!()
        }
        async fn flush_stats(&self, _: i64, _: &str, _: crate::store::StatDeltas) -> crate::Result<bool> {
            // domain_stats_flush_interval is 0 in these tests, so this is never called.
            unimplemented!()
        }
        async fn expire_stale_claims(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn force_release_by_worker(&self, _: &str) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn force_release_all(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn reset_domain(&self, _: &str) -> crate::Result<bool> {
            unimplemented!()
        }
        async fn count_expired_claims(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn count_claims_by_worker(&self, _: &str) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn count_active_claims(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn count_non_terminal(&self) -> crate::Result<u64> {
            unimplemented!()
        }
        async fn backfill_upsert(&self, _: &str, _: &crate::store::BackfillStats) -> crate::Result<()> {
            unimplemented!()
        }
        async fn set_images_stored(&self, _: &str, _: i64) -> crate::Result<bool> {
            unimplemented!()
        }
    }

    fn test_config(max_pages_per_run: u32) -> Config {
        Config {
            scheduling: SchedulingConfig {
                enable_smart_scheduling: true,
                enable_claim_protocol: true,
                enable_per_domain_budget: true,
                max_pages_per_run,
                domain_stats_flush_interval: 0,
                canonicalization_strip_subdomains: false,
            },
            claim: ClaimConfig {
                batch_size: 10,
                lease_minutes: 30,
                renewal_interval_minutes: 10,
            },
            priority: PriorityConfig {
                never_crawled_epoch: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            },
            checkpoint: CheckpointConfig { ttl_days: 30 },
            stores: StoresConfig {
                postgres_url: "postgres://unused".to_string(),
                redis_url: "redis://unused".to_string(),
                min_connections: 1,
                max_connections: 10,
            },
        }
    }

    fn domain_record(id: i64, domain: &str) -> DomainRecord {
        DomainRecord {
            id,
            domain: domain.to_string(),
            status: "active".to_string(),
            version: 1,
            claimed_by: Some("host-1".to_string()),
            claim_expires_at: Some(Utc::now()),
            pages_discovered: 0,
            pages_crawled: 0,
            images_found: 0,
            images_stored: 0,
            total_error_count: 0,
            consecutive_error_count: 0,
            image_yield_rate: None,
            avg_images_per_page: None,
            error_rate: None,
            priority_score: 0,
            priority_computed_at: None,
            seed_rank: None,
            source: "seed".to_string(),
            frontier_checkpoint_id: None,
            frontier_size: 0,
            first_seen_at: Utc::now(),
            last_crawled_at: None,
            next_crawl_after: None,
            block_reason: None,
            block_reason_code: None,
            last_crawl_run_id: None,
        }
    }

    fn response(domain: &str, discovered: Vec<CrawlRequest>) -> CrawlResponse {
        CrawlResponse {
            url: format!("https://{domain}/"),
            domain: domain.to_string(),
            depth: 0,
            status: 200,
            content_type: "text/html".to_string(),
            body_len: 128,
            images_found: 3,
            images_stored: 2,
            error: None,
            discovered,
        }
    }

    fn discovered_links(domain: &str, n: usize) -> Vec<CrawlRequest> {
        (0..n)
            .map(|i| CrawlRequest {
                url: format!("https://{domain}/page-{i}"),
                domain: domain.to_string(),
                depth: 1,
            })
            .collect()
    }

    /// Within budget, `on_page` hands discovered links back to the engine
    /// instead of silently dropping them, and accumulates `images_stored`
    /// from the response rather than leaving it permanently at zero.
    #[tokio::test]
    async fn on_page_returns_within_budget_discovered_links() {
        let state = Arc::new(Mutex::new(SessionState::new()));
        state.lock().await.insert_claim(domain_record(1, "budget.example"));

        let callback = SessionCallback {
            config: test_config(0),
            repo: Arc::new(NoFlushRepo),
            worker_id: "host-1".to_string(),
            state: state.clone(),
        };

        let links = discovered_links("budget.example", 3);
        let returned = callback.on_page(response("budget.example", links.clone())).await;

        assert_eq!(returned, links);

        let guard = state.lock().await;
        let claimed = guard.get(1).unwrap();
        assert_eq!(claimed.counters.pages_discovered, 3);
        assert_eq!(claimed.counters.images_found, 3);
        assert_eq!(claimed.counters.images_stored, 2);
        assert!(claimed.pending.is_empty());
    }

    /// Past the per-domain budget, discovered links are checkpointed for a
    /// later run rather than returned to the engine, but still count toward
    /// the frontier total so `pages_discovered - pages_crawled` reflects
    /// them for priority scoring.
    #[tokio::test]
    async fn on_page_checkpoints_links_past_budget_but_still_counts_them() {
        let state = Arc::new(Mutex::new(SessionState::new()));
        let mut record = domain_record(2, "over-budget.example");
        record.pages_crawled = 1;
        state.lock().await.insert_claim(record);
        state.lock().await.get_mut(2).unwrap().counters.pages_crawled = 1;

        let callback = SessionCallback {
            config: test_config(1),
            repo: Arc::new(NoFlushRepo),
            worker_id: "host-1".to_string(),
            state: state.clone(),
        };

        let links = discovered_links("over-budget.example", 2);
        let returned = callback
            .on_page(response("over-budget.example", links.clone()))
            .await;

        assert!(returned.is_empty());

        let guard = state.lock().await;
        let claimed = guard.get(2).unwrap();
        assert_eq!(claimed.counters.pages_discovered, 2);
        assert_eq!(claimed.pending.len(), 2);
    }

    /// `ScriptedEngine` drives `on_page` exactly like a real engine would:
    /// everything it yields back is recorded, not dropped on the floor.
    #[tokio::test]
    async fn scripted_engine_enqueues_what_on_page_returns() {
        let state = Arc::new(Mutex::new(SessionState::new()));
        state.lock().await.insert_claim(domain_record(3, "scripted.example"));

        let callback = SessionCallback {
            config: test_config(0),
            repo: Arc::new(NoFlushRepo),
            worker_id: "host-1".to_string(),
            state: state.clone(),
        };

        let links = discovered_links("scripted.example", 2);
        let engine = ScriptedEngine::new(vec![response("scripted.example", links.clone())]);
        engine.run(Vec::new(), &callback).await;

        assert_eq!(engine.enqueued(), links);
    }
}
