use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::errors::HitlError;
use crate::models::{HitlRequest, HitlStatus, NewHitlRequest};
use crate::store::{HitlStore, Resolve};

/// Outcome of resolving an approval request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub request: HitlRequest,
    pub status: HitlStatus,
    /// The reviewer asked to re-run the phase.
    pub iterate: bool,
}

/// Lifecycle of human-approval requests.
///
/// At most one request per (run, checkpoint) is pending at any time, and a
/// pending request can be decided exactly once.
pub struct HitlGateway {
    store: Arc<dyn HitlStore>,
    ttl: Duration,
}

impl HitlGateway {
    pub fn new(store: Arc<dyn HitlStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a request, superseding any pending one for the same checkpoint.
    pub async fn request_approval(&self, request: NewHitlRequest) -> Result<HitlRequest, HitlError> {
        let now = Utc::now();
        let created = self
            .store
            .insert_superseding(request, now, now + self.ttl)
            .await?;
        info!(
            run_id = %created.run_id,
            checkpoint = %created.checkpoint_name,
            request_id = %created.id,
            recommended = %created.recommended_option,
            "Approval requested"
        );
        Ok(created)
    }

    /// Record a decision on a pending request.
    ///
    /// `reject` and `kill` resolve to rejected, everything else to approved;
    /// `iterate` additionally sets the iterate flag.
    pub async fn resolve(
        &self,
        request_id: &str,
        decision: &str,
        notes: Option<String>,
        decided_by: Option<String>,
    ) -> Result<Resolution, HitlError> {
        let request = self.store.get(request_id).await?;
        if request.status != HitlStatus::Pending {
            return Err(HitlError::InvalidState {
                request_id: request_id.to_string(),
                status: request.status,
            });
        }
        if !request.has_option(decision) {
            return Err(HitlError::InvalidDecision {
                checkpoint: request.checkpoint_name,
                decision: decision.to_string(),
            });
        }

        let status = match decision {
            "reject" | "kill" => HitlStatus::Rejected,
            _ => HitlStatus::Approved,
        };
        let resolved = self
            .store
            .resolve_if_pending(
                request_id,
                Resolve {
                    status,
                    decision: decision.to_string(),
                    notes,
                    decided_by,
                    decided_at: Utc::now(),
                },
            )
            .await?;

        if !resolved {
            // Lost a race with another resolve or with expiry.
            let current = self.store.get(request_id).await?;
            warn!(
                request_id,
                status = %current.status,
                "Approval request changed before it could be resolved"
            );
            return Err(HitlError::InvalidState {
                request_id: request_id.to_string(),
                status: current.status,
            });
        }

        let request = self.store.get(request_id).await?;
        info!(
            run_id = %request.run_id,
            checkpoint = %request.checkpoint_name,
            request_id,
            decision,
            status = %status,
            "Approval resolved"
        );
        Ok(Resolution {
            request,
            status,
            iterate: decision == "iterate",
        })
    }

    pub async fn pending_for(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, HitlError> {
        Ok(self.store.pending_for(run_id, checkpoint).await?)
    }

    pub async fn latest_for(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, HitlError> {
        Ok(self.store.latest_for(run_id, checkpoint).await?)
    }

    pub async fn pending_for_run(&self, run_id: &str) -> Result<Option<HitlRequest>, HitlError> {
        Ok(self.store.pending_for_run(run_id).await?)
    }

    /// Withdraw all pending requests of a run that stopped without a decision.
    pub async fn withdraw(&self, run_id: &str) -> Result<usize, HitlError> {
        let expired = self.store.expire_for_run(run_id).await?;
        if expired > 0 {
            info!(run_id, expired, "Withdrew pending approval requests");
        }
        Ok(expired)
    }

    /// Expire pending requests older than `ttl`.
    pub async fn expire_stale(&self, ttl: Duration) -> Result<usize, HitlError> {
        self.expire_stale_at(ttl, Utc::now()).await
    }

    pub async fn expire_stale_at(&self, ttl: Duration, now: DateTime<Utc>) -> Result<usize, HitlError> {
        let expired = self.store.expire_pending_before(now - ttl).await?;
        if expired > 0 {
            info!(expired, "Expired stale approval requests");
        }
        Ok(expired)
    }
}
