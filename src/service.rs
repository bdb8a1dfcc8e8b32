//! Entry points shared by the CLI and the HTTP API.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::config::VetterConfig;
use crate::errors::{DispatchError, HitlError, OrchestratorError, StageError, StoreError};
use crate::hitl::HitlGateway;
use crate::models::{Evidence, FailureKind, HitlRequest, ProgressEvent, RunState};
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::orchestrator::{CommandStage, ExecutionOutcome, Orchestrator, Stage, StageRequest};
use crate::progress::ProgressRecorder;
use crate::resume::{DecisionOutcome, ResumeDispatcher, ResumeOutcome};
use crate::retry::RetryPolicy;
use crate::store::{CheckpointStore, DbHandle};

/// Number of progress events included in a status view.
const PROGRESS_TAIL: usize = 20;

/// Everything a reviewer or operator needs to know about a run.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub run: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<HitlRequest>,
    pub progress: Vec<ProgressEvent>,
}

/// Stage used when no command is configured. Fails every phase fatally.
struct UnconfiguredStage;

#[async_trait]
impl Stage for UnconfiguredStage {
    async fn run(&self, _request: &StageRequest) -> Result<Evidence, StageError> {
        Err(StageError::Fatal(
            "no stage command configured (set [stage].command or VETTER_STAGE_CMD)".into(),
        ))
    }
}

pub struct ValidationService {
    store: DbHandle,
    hitl: Arc<HitlGateway>,
    progress: ProgressRecorder,
    orchestrator: Arc<Orchestrator>,
    dispatcher: ResumeDispatcher,
    config: VetterConfig,
}

impl ValidationService {
    pub fn new(
        store: DbHandle,
        stage: Arc<dyn Stage>,
        notifier: Arc<dyn Notifier>,
        config: VetterConfig,
    ) -> Self {
        let hitl = Arc::new(HitlGateway::new(
            Arc::new(store.clone()),
            config.hitl.ttl(),
        ));
        let progress = ProgressRecorder::new(Arc::new(store.clone()));
        let orchestrator = Arc::new(
            Orchestrator::new(
                Arc::new(store.clone()),
                hitl.clone(),
                stage,
                notifier,
                progress.clone(),
            )
            .configure(&config),
        );
        let dispatcher = ResumeDispatcher::new(orchestrator.clone(), hitl.clone());
        Self {
            store,
            hitl,
            progress,
            orchestrator,
            dispatcher,
            config,
        }
    }

    /// Open the configured database and wire the configured stage and
    /// notifier.
    pub fn open(config: VetterConfig, project_dir: &Path) -> Result<Self> {
        let db_path = config.db_path(project_dir);
        let store = DbHandle::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        let stage: Arc<dyn Stage> = match &config.stage.command {
            Some(command) => Arc::new(
                CommandStage::new(command.clone(), config.stage.args.clone())
                    .current_dir(project_dir),
            ),
            None => Arc::new(UnconfiguredStage),
        };

        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url,
                std::time::Duration::from_secs(config.notify.timeout_secs),
                RetryPolicy::from_config(&config.retry),
            )?),
            None => Arc::new(LogNotifier),
        };

        Ok(Self::new(store, stage, notifier, config))
    }

    pub fn config(&self) -> &VetterConfig {
        &self.config
    }

    pub fn hitl(&self) -> Arc<HitlGateway> {
        self.hitl.clone()
    }

    /// Create a pending run at the first phase. Nothing executes yet.
    pub async fn kickoff(
        &self,
        project_ref: &str,
        user_ref: &str,
        input: serde_json::Value,
    ) -> Result<String, StoreError> {
        let run = RunState::new(project_ref, user_ref, input);
        self.store.save(&run).await?;
        info!(run_id = %run.id, project_ref, user_ref, "Run created");
        Ok(run.id)
    }

    /// Create a run and execute it on a background task.
    pub async fn kickoff_detached(
        &self,
        project_ref: &str,
        user_ref: &str,
        input: serde_json::Value,
    ) -> Result<String, StoreError> {
        let run_id = self.kickoff(project_ref, user_ref, input).await?;
        self.spawn_execute(run_id.clone());
        Ok(run_id)
    }

    pub async fn execute(&self, run_id: &str) -> Result<ExecutionOutcome, OrchestratorError> {
        self.orchestrator.execute(run_id).await
    }

    pub async fn status(&self, run_id: &str) -> Result<StatusView, StoreError> {
        let run = self.store.load(run_id).await?;
        let pending_approval = self.hitl.pending_for_run(run_id).await.map_err(|e| match e {
            HitlError::Store(e) => e,
            other => StoreError::Database(other.into()),
        })?;
        let progress = self.progress.tail(run_id, PROGRESS_TAIL).await;
        Ok(StatusView {
            run,
            pending_approval,
            progress,
        })
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<RunState>, StoreError> {
        self.store.list(limit).await
    }

    /// Apply a decision and continue the run on a background task.
    pub async fn submit_decision(
        &self,
        run_id: &str,
        checkpoint: &str,
        decision: &str,
        notes: Option<String>,
        decided_by: Option<String>,
    ) -> Result<DecisionOutcome, DispatchError> {
        let outcome = self
            .dispatcher
            .apply(run_id, checkpoint, decision, notes, decided_by)
            .await?;
        if outcome.continues() {
            self.spawn_execute(outcome.run_id.clone());
        }
        Ok(outcome)
    }

    /// Apply a decision and continue the run inline.
    pub async fn submit_decision_and_wait(
        &self,
        run_id: &str,
        checkpoint: &str,
        decision: &str,
        notes: Option<String>,
        decided_by: Option<String>,
    ) -> Result<ResumeOutcome, DispatchError> {
        self.dispatcher
            .resume(run_id, checkpoint, decision, notes, decided_by)
            .await
    }

    /// Operator override: move a non-terminal run to failed.
    pub async fn fail_run(
        &self,
        run_id: &str,
        reason: &str,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        let mut run = self.store.load(run_id).await?;
        if run.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal {
                run_id: run.id,
                status: run.status,
            });
        }
        run.fail(FailureKind::Operator, reason);
        let outcome = self.orchestrator.finish(run).await?;
        self.hitl.withdraw(run_id).await?;
        Ok(outcome)
    }

    /// Expire pending requests older than the configured TTL.
    pub async fn sweep(&self) -> Result<usize, HitlError> {
        self.hitl.expire_stale(self.config.hitl.ttl()).await
    }

    fn spawn_execute(&self, run_id: String) {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            match orchestrator.execute(&run_id).await {
                Ok(outcome) => info!(run_id = %run_id, ?outcome, "Background execution stopped"),
                Err(e) => error!(run_id = %run_id, error = %e, "Background execution failed"),
            }
        });
    }
}
