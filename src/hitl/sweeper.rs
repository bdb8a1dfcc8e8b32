use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as Ttl;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::HitlGateway;

/// Background task that periodically expires stale approval requests.
pub struct ExpirySweeper {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Start sweeping every `every`. The first sweep runs immediately.
    pub fn start(gateway: Arc<HitlGateway>, ttl: Ttl, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        match gateway.expire_stale(ttl).await {
                            Ok(expired) => debug!(expired, "Expiry sweep finished"),
                            Err(e) => warn!(error = %e, "Expiry sweep failed"),
                        }
                    }
                }
            }
        });
        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Signal the task to stop and wait for it.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HitlContext, NewHitlRequest, RunState};
    use crate::phase::Phase;
    use crate::signals::{FitSignal, Signal};
    use crate::store::{CheckpointStore, DbHandle, HitlStore};

    #[tokio::test]
    async fn test_sweeper_expires_and_stops() {
        let db = DbHandle::in_memory().unwrap();
        let run = RunState::new("p", "u", serde_json::Value::Null);
        db.save(&run).await.unwrap();
        let gateway = Arc::new(HitlGateway::new(Arc::new(db.clone()), Ttl::days(7)));
        gateway
            .request_approval(NewHitlRequest {
                run_id: run.id.clone(),
                checkpoint_name: "approve_discovery_output".into(),
                phase: Phase::Discovery,
                context: HitlContext {
                    evidence_summary: String::new(),
                    signal: Signal::Discovery(FitSignal::FitConfirmed),
                    rationale: String::new(),
                    measures: Default::default(),
                    route: String::new(),
                    recommended_option: "approved".into(),
                },
                options: Vec::new(),
                recommended_option: "approved".into(),
            })
            .await
            .unwrap();

        // A zero TTL makes every pending request stale.
        let mut sweeper =
            ExpirySweeper::start(gateway, Ttl::zero(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.stop().await;

        assert!(db.pending_for_run(&run.id).await.unwrap().is_none());
    }
}
