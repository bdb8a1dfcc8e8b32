use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::stage::{Stage, StageRequest};
use crate::config::VetterConfig;
use crate::errors::{OrchestratorError, StageError, StoreError};
use crate::hitl::HitlGateway;
use crate::models::{
    Evidence, FailureKind, HitlContext, NewHitlRequest, PendingGate, RunState,
    RunStatus,
};
use crate::notify::{Notification, Notifier};
use crate::progress::ProgressRecorder;
use crate::retry::RetryPolicy;
use crate::routing::{self, Route, RoutingPolicy};
use crate::signals::SignalEvaluator;
use crate::store::CheckpointStore;

/// Where an execution stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    AwaitingApproval {
        checkpoint: String,
        request_id: String,
    },
    Completed,
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

/// Drives a run through its phases until it completes, fails or needs a
/// human.
///
/// Every state change is saved before anything outside the store (approval
/// requests, notifications, the next stage) sees it.
pub struct Orchestrator {
    store: Arc<dyn CheckpointStore>,
    hitl: Arc<HitlGateway>,
    stage: Arc<dyn Stage>,
    notifier: Arc<dyn Notifier>,
    progress: ProgressRecorder,
    evaluator: SignalEvaluator,
    policy: RoutingPolicy,
    retry: RetryPolicy,
    stage_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        hitl: Arc<HitlGateway>,
        stage: Arc<dyn Stage>,
        notifier: Arc<dyn Notifier>,
        progress: ProgressRecorder,
    ) -> Self {
        Self {
            store,
            hitl,
            stage,
            notifier,
            progress,
            evaluator: SignalEvaluator::default(),
            policy: RoutingPolicy::default(),
            retry: RetryPolicy::default(),
            stage_timeout: VetterConfig::default().stage.timeout(),
        }
    }

    /// Apply thresholds, ceilings, retry and timeout settings from config.
    pub fn configure(mut self, config: &VetterConfig) -> Self {
        self.evaluator = SignalEvaluator::new(config.signals.clone());
        self.policy = RoutingPolicy::new(config.routing.clone());
        self.retry = RetryPolicy::from_config(&config.retry);
        self.stage_timeout = config.stage.timeout();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Run phases from the run's current phase until the run stops.
    #[instrument(skip(self))]
    pub async fn execute(&self, run_id: &str) -> Result<ExecutionOutcome, OrchestratorError> {
        let mut run = self.store.load(run_id).await?;
        match run.status {
            RunStatus::Completed | RunStatus::Failed => {
                return Err(OrchestratorError::AlreadyTerminal {
                    run_id: run.id,
                    status: run.status,
                });
            }
            RunStatus::AwaitingApproval => {
                return Err(OrchestratorError::AwaitingApproval {
                    checkpoint: run.gate.map(|g| g.checkpoint).unwrap_or_default(),
                    run_id: run.id,
                });
            }
            RunStatus::Pending | RunStatus::Running => {}
        }

        // Stage output already saved, the request was never confirmed.
        if run.status == RunStatus::Running && run.gate.is_some() {
            info!(run_id, "Re-issuing approval request for persisted gate");
            return self.open_gate(&mut run).await;
        }

        loop {
            run.status = RunStatus::Running;
            run.touch();
            self.persist(&run).await?;

            let phase = run.phase;
            let stage_name = phase.as_str();
            self.progress.started(&run.id, phase, stage_name).await;

            let evidence = match self.invoke_stage(&run).await {
                Ok(evidence) => evidence,
                Err(err) => {
                    warn!(run_id, %phase, error = %err, "Stage failed");
                    self.progress
                        .failed(&run.id, phase, stage_name, err.to_string())
                        .await;
                    run.fail(FailureKind::StageFailed, err.to_string());
                    return self.finish(run).await;
                }
            };

            let assessment = self.evaluator.evaluate(&evidence);
            self.progress
                .completed(
                    &run.id,
                    phase,
                    stage_name,
                    format!("{} ({})", evidence.summary(), assessment.signal),
                )
                .await;
            info!(
                run_id,
                %phase,
                signal = %assessment.signal,
                rationale = %assessment.rationale,
                "Phase evaluated"
            );

            run.record_evidence(evidence);
            run.last_signal = Some(assessment.signal);
            let decision = self.policy.route(assessment.signal, &run.pivot_history);

            if let Some(gate) = decision.gate {
                run.gate = Some(PendingGate {
                    checkpoint: gate.checkpoint.to_string(),
                    phase,
                    recommended: gate.recommended.to_string(),
                    request_id: None,
                });
                run.touch();
                self.persist(&run).await?;
                return self.open_gate(&mut run).await;
            }

            match decision.route {
                Route::Advance { to } => {
                    debug!(run_id, from = %phase, %to, "Advancing without approval");
                    run.phase = to;
                }
                Route::Pivot { .. } => {
                    return Err(corrupt(&run, "pivot routed without an approval gate"));
                }
                Route::Complete => {
                    run.complete();
                    return self.finish(run).await;
                }
                Route::Kill { reason } => {
                    run.fail(FailureKind::Killed, reason);
                    return self.finish(run).await;
                }
            }
        }
    }

    /// Invoke the stage for the run's phase with timeout and bounded retry.
    async fn invoke_stage(&self, run: &RunState) -> Result<Evidence, StageError> {
        let mut attempt = 1;
        loop {
            let request = StageRequest::for_run(run, attempt);
            let result = match tokio::time::timeout(self.stage_timeout, self.stage.run(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout {
                    secs: self.stage_timeout.as_secs(),
                }),
            }
            .and_then(|evidence| {
                if evidence.phase() == run.phase {
                    Ok(evidence)
                } else {
                    Err(StageError::WrongPhase {
                        expected: run.phase,
                        actual: evidence.phase(),
                    })
                }
            });

            match result {
                Ok(evidence) => return Ok(evidence),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        run_id = %run.id,
                        phase = %run.phase,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient stage failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Create the approval request for the run's persisted gate, then park
    /// the run.
    async fn open_gate(&self, run: &mut RunState) -> Result<ExecutionOutcome, OrchestratorError> {
        let Some(gate) = run.gate.clone() else {
            return Err(corrupt(run, "no gate to open"));
        };
        let Some(spec) = routing::checkpoint(&gate.checkpoint) else {
            return Err(corrupt(run, "gate names an unknown checkpoint"));
        };
        let Some(evidence) = run.evidence.get(&gate.phase) else {
            return Err(corrupt(run, "gate without evidence"));
        };

        let assessment = self.evaluator.evaluate(evidence);
        let decision = self.policy.route(assessment.signal, &run.pivot_history);
        let context = HitlContext {
            evidence_summary: run.evidence_summary(),
            signal: assessment.signal,
            rationale: assessment.rationale,
            measures: assessment.measures,
            route: decision.route.describe(),
            recommended_option: gate.recommended.clone(),
        };

        let request = self
            .hitl
            .request_approval(NewHitlRequest {
                run_id: run.id.clone(),
                checkpoint_name: gate.checkpoint.clone(),
                phase: gate.phase,
                context,
                options: spec.decision_options(),
                recommended_option: gate.recommended.clone(),
            })
            .await?;

        run.status = RunStatus::AwaitingApproval;
        run.gate = Some(PendingGate {
            request_id: Some(request.id.clone()),
            ..gate
        });
        run.touch();
        if let Err(err) = self.persist(run).await {
            if matches!(err, OrchestratorError::AlreadyTerminal { .. })
                && let Err(e) = self.hitl.withdraw(&run.id).await
            {
                warn!(run_id = %run.id, error = %e, "Failed to withdraw approval request");
            }
            return Err(err);
        }

        self.send(Notification::approval_requested(run, &request))
            .await;
        Ok(ExecutionOutcome::AwaitingApproval {
            checkpoint: request.checkpoint_name,
            request_id: request.id,
        })
    }

    /// Persist a terminal run and tell the outside world.
    pub(crate) async fn finish(
        &self,
        run: RunState,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        self.persist(&run).await?;
        info!(
            run_id = %run.id,
            status = %run.status,
            reason = run.failure.as_ref().map(|f| f.message.as_str()).unwrap_or(""),
            "Run finished"
        );
        self.send(Notification::run_finished(&run)).await;
        Ok(match run.failure {
            Some(failure) => ExecutionOutcome::Failed {
                kind: failure.kind,
                reason: failure.message,
            },
            None => ExecutionOutcome::Completed,
        })
    }

    /// Save the run. A run that reached a terminal status elsewhere in the
    /// meantime ends this execution as `AlreadyTerminal`.
    async fn persist(&self, run: &RunState) -> Result<(), OrchestratorError> {
        match self.store.save(run).await {
            Err(StoreError::RunFinalized { run_id }) => {
                let status = self.store.load(&run_id).await?.status;
                info!(%run_id, %status, "Run finalized elsewhere, abandoning execution");
                Err(OrchestratorError::AlreadyTerminal { run_id, status })
            }
            other => Ok(other?),
        }
    }

    async fn send(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(
                event = notification.event(),
                run_id = notification.run_id(),
                error = %e,
                "Notification failed"
            );
        }
    }
}

fn corrupt(run: &RunState, message: &str) -> OrchestratorError {
    OrchestratorError::Persistence(StoreError::Corrupt {
        key: run.id.clone(),
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingConfig;
    use crate::models::{
        ComponentAssessment, ComponentStatus, DesirabilityEvidence, DiscoveryEvidence,
        FeasibilityEvidence, HitlStatus,
    };
    use crate::notify::MemoryNotifier;
    use crate::phase::Phase;
    use crate::store::{DbHandle, HitlStore, ProgressLog};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Returns queued results in order, one per call.
    #[derive(Default)]
    struct ScriptedStage {
        results: Mutex<VecDeque<Result<Evidence, StageError>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedStage {
        fn new(results: Vec<Result<Evidence, StageError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        async fn run(&self, _request: &StageRequest) -> Result<Evidence, StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(StageError::Fatal("script exhausted".into())))
        }
    }

    /// Store whose saves can be switched off.
    struct FlakyStore {
        inner: DbHandle,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl CheckpointStore for FlakyStore {
        async fn save(&self, state: &RunState) -> Result<(), StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Database(anyhow::anyhow!("disk full")));
            }
            self.inner.save(state).await
        }

        async fn load(&self, run_id: &str) -> Result<RunState, StoreError> {
            self.inner.load(run_id).await
        }

        async fn list(&self, limit: usize) -> Result<Vec<RunState>, StoreError> {
            self.inner.list(limit).await
        }
    }

    struct Harness {
        db: DbHandle,
        stage: Arc<ScriptedStage>,
        notifier: Arc<MemoryNotifier>,
        orchestrator: Orchestrator,
    }

    fn harness(stage: ScriptedStage, config: VetterConfig) -> Harness {
        let db = DbHandle::in_memory().unwrap();
        let stage = Arc::new(stage);
        let notifier = Arc::new(MemoryNotifier::default());
        let orchestrator = Orchestrator::new(
            Arc::new(db.clone()),
            Arc::new(HitlGateway::new(Arc::new(db.clone()), chrono::Duration::days(7))),
            stage.clone(),
            notifier.clone(),
            ProgressRecorder::new(Arc::new(db.clone())),
        )
        .configure(&config)
        .with_retry(RetryPolicy::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(2),
        ));
        Harness {
            db,
            stage,
            notifier,
            orchestrator,
        }
    }

    async fn new_run(db: &DbHandle, phase: Phase) -> RunState {
        let mut run = RunState::new("proj", "user", serde_json::json!({"idea": "x"}));
        run.phase = phase;
        db.save(&run).await.unwrap();
        run
    }

    fn discovery(fit: f64) -> Evidence {
        Evidence::Discovery(DiscoveryEvidence {
            segments: vec!["freelancers".into()],
            value_proposition: "invoices in one click".into(),
            fit_score: fit,
        })
    }

    fn desirability(impressions: u64, clicks: u64, signups: u64) -> Evidence {
        Evidence::Desirability(DesirabilityEvidence {
            impressions,
            clicks,
            signups,
            spend_usd: 250.0,
        })
    }

    fn feasibility(status: ComponentStatus) -> Evidence {
        Evidence::Feasibility(FeasibilityEvidence {
            components: vec![ComponentAssessment {
                name: "ocr".into(),
                status,
            }],
            monthly_cost_usd: 120.0,
        })
    }

    #[tokio::test]
    async fn test_gate_persists_before_request_and_notifies() {
        let h = harness(ScriptedStage::new(vec![Ok(discovery(0.9))]), VetterConfig::default());
        let run = new_run(&h.db, Phase::Discovery).await;

        let outcome = h.orchestrator.execute(&run.id).await.unwrap();
        let ExecutionOutcome::AwaitingApproval {
            checkpoint,
            request_id,
        } = outcome
        else {
            panic!("expected approval, got {:?}", outcome);
        };
        assert_eq!(checkpoint, "approve_discovery_output");

        let saved = h.db.load(&run.id).await.unwrap();
        assert_eq!(saved.status, RunStatus::AwaitingApproval);
        assert_eq!(saved.phase, Phase::Discovery);
        assert!(saved.evidence.contains_key(&Phase::Discovery));
        assert_eq!(
            saved.gate.as_ref().and_then(|g| g.request_id.clone()),
            Some(request_id.clone())
        );

        let request = HitlStore::get(&h.db, &request_id).await.unwrap();
        assert_eq!(request.status, HitlStatus::Pending);
        assert_eq!(request.recommended_option, "approved");
        assert_eq!(request.context.route, "advance to desirability");
        assert_eq!(request.options.len(), 3);

        let events = h.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event(), "approval_requested");
    }

    #[tokio::test]
    async fn test_no_interest_requests_segment_pivot() {
        let h = harness(
            ScriptedStage::new(vec![Ok(desirability(10_000, 450, 150))]),
            VetterConfig::default(),
        );
        let run = new_run(&h.db, Phase::Desirability).await;

        match h.orchestrator.execute(&run.id).await.unwrap() {
            ExecutionOutcome::AwaitingApproval { checkpoint, .. } => {
                assert_eq!(checkpoint, "approve_segment_pivot")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let request = h
            .db
            .pending_for(&run.id, "approve_segment_pivot")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.recommended_option, "segment_1");
        assert!((request.context.measures["problem_resonance"] - 0.06).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let h = harness(
            ScriptedStage::new(vec![
                Err(StageError::Transient("rate limited".into())),
                Ok(discovery(0.9)),
            ]),
            VetterConfig::default(),
        );
        let run = new_run(&h.db, Phase::Discovery).await;

        let outcome = h.orchestrator.execute(&run.id).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::AwaitingApproval { .. }));
        assert_eq!(h.stage.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_run() {
        let h = harness(
            ScriptedStage::new(vec![
                Err(StageError::Transient("a".into())),
                Err(StageError::Transient("b".into())),
                Err(StageError::Transient("c".into())),
            ]),
            VetterConfig::default(),
        );
        let run = new_run(&h.db, Phase::Discovery).await;

        let outcome = h.orchestrator.execute(&run.id).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Failed {
                kind: FailureKind::StageFailed,
                reason: "Transient stage failure: c".into(),
            }
        );
        assert_eq!(h.stage.calls(), 3);
        let saved = h.db.load(&run.id).await.unwrap();
        assert_eq!(saved.status, RunStatus::Failed);
        assert_eq!(h.notifier.events()[0].event(), "run_finished");
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let h = harness(
            ScriptedStage::new(vec![Err(StageError::Fatal("bad input".into()))]),
            VetterConfig::default(),
        );
        let run = new_run(&h.db, Phase::Discovery).await;

        let outcome = h.orchestrator.execute(&run.id).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                kind: FailureKind::StageFailed,
                ..
            }
        ));
        assert_eq!(h.stage.calls(), 1);
    }

    #[tokio::test]
    async fn test_stage_timeout_counts_as_transient() {
        let stage = ScriptedStage {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedStage::new(vec![Ok(discovery(0.9)), Ok(discovery(0.9))])
        };
        let h = harness(stage, VetterConfig::default());
        let orchestrator = h
            .orchestrator
            .with_stage_timeout(Duration::from_millis(10))
            .with_retry(RetryPolicy::new(2, Duration::ZERO, Duration::ZERO));
        let run = new_run(&h.db, Phase::Discovery).await;

        match orchestrator.execute(&run.id).await.unwrap() {
            ExecutionOutcome::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::StageFailed);
                assert!(reason.contains("budget"), "{}", reason);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.stage.calls(), 2);
    }

    #[tokio::test]
    async fn test_evidence_for_wrong_phase_is_fatal() {
        let h = harness(
            ScriptedStage::new(vec![Ok(desirability(10, 5, 5))]),
            VetterConfig::default(),
        );
        let run = new_run(&h.db, Phase::Discovery).await;

        let outcome = h.orchestrator.execute(&run.id).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
        assert_eq!(h.stage.calls(), 1);
    }

    #[tokio::test]
    async fn test_red_feasibility_kills_without_request() {
        let h = harness(
            ScriptedStage::new(vec![Ok(feasibility(ComponentStatus::Impossible))]),
            VetterConfig::default(),
        );
        let run = new_run(&h.db, Phase::Feasibility).await;

        let outcome = h.orchestrator.execute(&run.id).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                kind: FailureKind::Killed,
                ..
            }
        ));
        assert!(h.db.pending_for_run(&run.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ungated_checkpoints_continue_in_process() {
        let config = VetterConfig {
            routing: RoutingConfig {
                ungated_checkpoints: vec![
                    "approve_discovery_output".into(),
                    "approve_desirability_gate".into(),
                ],
                ..RoutingConfig::default()
            },
            ..VetterConfig::default()
        };
        let h = harness(
            ScriptedStage::new(vec![
                Ok(discovery(0.9)),
                Ok(desirability(1000, 400, 300)),
                Ok(feasibility(ComponentStatus::Feasible)),
            ]),
            config,
        );
        let run = new_run(&h.db, Phase::Discovery).await;

        match h.orchestrator.execute(&run.id).await.unwrap() {
            ExecutionOutcome::AwaitingApproval { checkpoint, .. } => {
                assert_eq!(checkpoint, "approve_feasibility_gate")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.stage.calls(), 3);
        let saved = h.db.load(&run.id).await.unwrap();
        assert_eq!(saved.phase, Phase::Feasibility);
        assert_eq!(saved.evidence.len(), 3);
        assert_eq!(h.db.tail(&run.id, 100).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_terminal_and_parked_runs_are_rejected() {
        let h = harness(ScriptedStage::new(vec![]), VetterConfig::default());

        let mut done = new_run(&h.db, Phase::Viability).await;
        done.complete();
        h.db.save(&done).await.unwrap();
        assert!(matches!(
            h.orchestrator.execute(&done.id).await,
            Err(OrchestratorError::AlreadyTerminal { .. })
        ));

        let mut parked = new_run(&h.db, Phase::Desirability).await;
        parked.status = RunStatus::AwaitingApproval;
        parked.gate = Some(PendingGate {
            checkpoint: "approve_value_pivot".into(),
            phase: Phase::Desirability,
            recommended: "approved".into(),
            request_id: Some("req".into()),
        });
        h.db.save(&parked).await.unwrap();
        assert!(matches!(
            h.orchestrator.execute(&parked.id).await,
            Err(OrchestratorError::AwaitingApproval { checkpoint, .. }) if checkpoint == "approve_value_pivot"
        ));
        assert_eq!(h.stage.calls(), 0);
    }

    #[tokio::test]
    async fn test_persisted_gate_is_reissued_without_rerunning_stage() {
        let h = harness(ScriptedStage::new(vec![]), VetterConfig::default());
        let mut run = new_run(&h.db, Phase::Desirability).await;
        run.status = RunStatus::Running;
        run.record_evidence(desirability(1000, 400, 50));
        run.gate = Some(PendingGate {
            checkpoint: "approve_value_pivot".into(),
            phase: Phase::Desirability,
            recommended: "approved".into(),
            request_id: None,
        });
        h.db.save(&run).await.unwrap();

        let outcome = h.orchestrator.execute(&run.id).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::AwaitingApproval { .. }));
        assert_eq!(h.stage.calls(), 0);
        assert_eq!(
            h.db.load(&run.id).await.unwrap().status,
            RunStatus::AwaitingApproval
        );
    }

    #[tokio::test]
    async fn test_failed_save_stops_before_side_effects() {
        let db = DbHandle::in_memory().unwrap();
        let run = new_run(&db, Phase::Discovery).await;
        let store = Arc::new(FlakyStore {
            inner: db.clone(),
            fail_saves: AtomicBool::new(true),
        });
        let stage = Arc::new(ScriptedStage::new(vec![Ok(discovery(0.9))]));
        let notifier = Arc::new(MemoryNotifier::default());
        let orchestrator = Orchestrator::new(
            store,
            Arc::new(HitlGateway::new(Arc::new(db.clone()), chrono::Duration::days(7))),
            stage.clone(),
            notifier.clone(),
            ProgressRecorder::new(Arc::new(db.clone())),
        );

        let err = orchestrator.execute(&run.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Persistence(_)));
        assert_eq!(stage.calls(), 0);
        assert!(notifier.events().is_empty());
        assert!(db.pending_for_run(&run.id).await.unwrap().is_none());
    }
}
