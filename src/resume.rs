//! Applying a reviewer's decision to a parked run.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::errors::DispatchError;
use crate::hitl::HitlGateway;
use crate::models::{FailureKind, HitlStatus, PivotRecord, RunState, RunStatus};
use crate::orchestrator::{ExecutionOutcome, Orchestrator};
use crate::phase::Phase;
use crate::routing::Transition;
use crate::store::CheckpointStore;

/// Result of applying one decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionOutcome {
    pub run_id: String,
    pub checkpoint: String,
    pub decision: String,
    /// `advance`, `pivot`, `iterate`, `complete` or `kill`.
    pub outcome: String,
    pub transition: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_phase: Option<Phase>,
    pub status: RunStatus,
}

impl DecisionOutcome {
    pub fn continues(&self) -> bool {
        self.next_phase.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeOutcome {
    pub decision: DecisionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutcome>,
}

pub struct ResumeDispatcher {
    orchestrator: Arc<Orchestrator>,
    hitl: Arc<HitlGateway>,
}

impl ResumeDispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>, hitl: Arc<HitlGateway>) -> Self {
        Self { orchestrator, hitl }
    }

    /// Resolve the pending request at `checkpoint` and move the run to the
    /// decision's target, without executing anything.
    ///
    /// Invalid input is rejected before any state is touched. Concurrent
    /// decisions are serialized by the single-use resolve: only one caller
    /// gets past it.
    #[instrument(skip(self, notes))]
    pub async fn apply(
        &self,
        run_id: &str,
        checkpoint: &str,
        decision: &str,
        notes: Option<String>,
        decided_by: Option<String>,
    ) -> Result<DecisionOutcome, DispatchError> {
        let policy = self.orchestrator.policy();
        policy.validate_decision(checkpoint, decision)?;

        let store = self.orchestrator.store();
        let mut run = store.load(run_id).await?;

        let parked_here = run.status == RunStatus::AwaitingApproval
            && run.gate.as_ref().is_some_and(|g| g.checkpoint == checkpoint);
        if !parked_here {
            if let Some(previous) = self.hitl.latest_for(run_id, checkpoint).await?
                && previous.status != HitlStatus::Pending
            {
                return Err(DispatchError::AlreadyDecided {
                    checkpoint: checkpoint.to_string(),
                    status: previous.status,
                });
            }
            return Err(DispatchError::NotAwaiting {
                run_id: run_id.to_string(),
                status: run.status,
                checkpoint: checkpoint.to_string(),
            });
        }

        let request = match self.hitl.pending_for(run_id, checkpoint).await? {
            Some(request) => request,
            None => {
                return Err(match self.hitl.latest_for(run_id, checkpoint).await? {
                    Some(previous) => DispatchError::AlreadyDecided {
                        checkpoint: checkpoint.to_string(),
                        status: previous.status,
                    },
                    None => DispatchError::NotFound {
                        run_id: run_id.to_string(),
                        checkpoint: checkpoint.to_string(),
                    },
                });
            }
        };

        // Ceilings are judged against the run as it was when it parked.
        let transition = policy.transition(&run, checkpoint, decision)?;
        let resolution = self
            .hitl
            .resolve(&request.id, decision, notes, decided_by.clone())
            .await?;

        apply_transition(&mut run, &transition, checkpoint, decided_by);
        info!(
            run_id,
            checkpoint,
            decision,
            status = %resolution.status,
            transition = transition.label(),
            "Decision applied"
        );

        if run.is_terminal() {
            self.orchestrator.finish(run.clone()).await?;
        } else {
            store.save(&run).await?;
        }

        Ok(DecisionOutcome {
            run_id: run.id,
            checkpoint: checkpoint.to_string(),
            decision: decision.to_string(),
            outcome: transition.label().to_string(),
            next_phase: transition.next_phase(),
            transition,
            status: run.status,
        })
    }

    /// `apply`, then execute the run inline when it continues.
    pub async fn resume(
        &self,
        run_id: &str,
        checkpoint: &str,
        decision: &str,
        notes: Option<String>,
        decided_by: Option<String>,
    ) -> Result<ResumeOutcome, DispatchError> {
        let decision = self
            .apply(run_id, checkpoint, decision, notes, decided_by)
            .await?;
        let execution = if decision.continues() {
            Some(self.orchestrator.execute(run_id).await?)
        } else {
            None
        };
        Ok(ResumeOutcome {
            decision,
            execution,
        })
    }
}

/// Move the run to where `transition` sends it.
fn apply_transition(
    run: &mut RunState,
    transition: &Transition,
    checkpoint: &str,
    decided_by: Option<String>,
) {
    run.gate = None;
    match transition {
        Transition::Advance { to } => {
            run.phase = *to;
            run.status = RunStatus::Running;
        }
        Transition::Pivot {
            pivot_type,
            target,
            reason,
        } => {
            run.pivot_history.push(PivotRecord {
                from_phase: run.phase,
                to_phase: *target,
                pivot_type: *pivot_type,
                checkpoint: checkpoint.to_string(),
                reason: reason.clone(),
                decided_by,
                timestamp: Utc::now(),
            });
            run.bump_iteration(*target);
            run.phase = *target;
            run.status = RunStatus::Running;
        }
        Transition::Iterate { phase } => {
            run.bump_iteration(*phase);
            run.phase = *phase;
            run.status = RunStatus::Running;
        }
        Transition::Complete => run.complete(),
        Transition::Kill { reason } => run.fail(FailureKind::Killed, reason.clone()),
    }
    run.touch();
}
