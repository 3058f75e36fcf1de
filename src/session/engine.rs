//! Crawl-engine contract (spec §6.1): the boundary between the scheduling
//! core and the external HTTP/parsing engine. This crate does not fetch
//! pages or parse HTML; it only feeds requests in and reacts to responses.

use async_trait::async_trait;

/// One fetch request, with the per-request metadata the session needs back
/// on the matching response: which domain it belongs to and its BFS depth.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub url: String,
    pub domain: String,
    pub depth: i64,
}

/// A fetched-and-parsed page, handed back to the session's callback.
#[derive(Debug, Clone)]
pub struct CrawlResponse {
    pub url: String,
    pub domain: String,
    pub depth: i64,
    pub status: u16,
    pub content_type: String,
    pub body_len: usize,
    pub images_found: u32,
    pub images_stored: u32,
    pub error: Option<String>,
    pub discovered: Vec<CrawlRequest>,
}

/// What the session supplies to the engine: a per-page callback and a
/// shutdown hook. Kept as its own trait so `CrawlEngine::run` can accept a
/// `&dyn` reference instead of a boxed closure.
#[async_trait]
pub trait PageParser: Send + Sync {
    /// Called once per fetched page. Returns newly discovered requests the
    /// engine should enqueue; the session has already applied the
    /// per-domain budget by the time it returns them here, so anything past
    /// budget is checkpointed instead and comes back as an empty `Vec`.
    async fn on_page(&self, response: CrawlResponse) -> Vec<CrawlRequest>;

    /// Called once, after the engine's frontier (including anything
    /// `on_page` enqueued) is exhausted, or the session asked it to stop.
    async fn closed(&self, reason: &str);
}

/// The external collaborator's contract (spec §6.1). No assumption is made
/// about its internal concurrency beyond: callbacks for one worker's
/// requests run on a single thread, so the session's in-memory maps need no
/// locking against the engine itself — only against the heartbeat task.
#[async_trait]
pub trait CrawlEngine: Send + Sync {
    async fn run(&self, seeds: Vec<CrawlRequest>, parser: &(dyn PageParser + Send + Sync));
}
