//! Lease-renewal heartbeat (spec §4.3/§4.6 step 5): a cooperative timer that
//! renews every owned claim every *R* and drops any claim whose renewal
//! comes back "lost".

use crate::store::DomainRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::state::SessionState;

/// Spawns the background renewal task. The returned handle should be
/// aborted during shutdown (spec §4.6 step 7: "stop the heartbeat timer").
pub fn spawn(
    worker_id: String,
    lease_minutes: i64,
    interval: Duration,
    repo: Arc<dyn DomainRepository>,
    state: Arc<Mutex<SessionState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            renew_all(&worker_id, lease_minutes, &repo, &state).await;
        }
    })
}

async fn renew_all(
    worker_id: &str,
    lease_minutes: i64,
    repo: &Arc<dyn DomainRepository>,
    state: &Arc<Mutex<SessionState>>,
) {
    let owned = state.lock().await.owned_ids();
    for id in owned {
        let renewed = repo.renew_claim(id, worker_id, lease_minutes).await;
        match renewed {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(domain_id = id, worker = worker_id, "claim lost on renewal");
                state.lock().await.drop_claim(id);
            }
            Err(e) => {
                tracing::warn!(domain_id = id, worker = worker_id, error = %e, "renewal call failed");
            }
        }
    }
}
