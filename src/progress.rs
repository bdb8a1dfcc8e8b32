//! Append-only progress log for stage lifecycle events.
//!
//! The orchestrator only writes here; status views read the tail. A failed
//! append is logged and otherwise ignored so that observability never blocks
//! a run.

use std::sync::Arc;

use tracing::warn;

use crate::models::{NewProgressEvent, ProgressEvent, ProgressStatus};
use crate::phase::Phase;
use crate::store::ProgressLog;

#[derive(Clone)]
pub struct ProgressRecorder {
    log: Arc<dyn ProgressLog>,
}

impl ProgressRecorder {
    pub fn new(log: Arc<dyn ProgressLog>) -> Self {
        Self { log }
    }

    pub async fn record(
        &self,
        run_id: &str,
        phase: Phase,
        stage: &str,
        status: ProgressStatus,
        summary: Option<String>,
    ) -> Option<ProgressEvent> {
        let event = NewProgressEvent {
            run_id: run_id.to_string(),
            phase,
            stage: stage.to_string(),
            status,
            summary,
        };
        match self.log.append(event).await {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(run_id, %phase, stage, error = %e, "Failed to record progress");
                None
            }
        }
    }

    pub async fn started(&self, run_id: &str, phase: Phase, stage: &str) {
        self.record(run_id, phase, stage, ProgressStatus::Started, None)
            .await;
    }

    pub async fn completed(&self, run_id: &str, phase: Phase, stage: &str, summary: String) {
        self.record(run_id, phase, stage, ProgressStatus::Completed, Some(summary))
            .await;
    }

    pub async fn failed(&self, run_id: &str, phase: Phase, stage: &str, reason: String) {
        self.record(run_id, phase, stage, ProgressStatus::Failed, Some(reason))
            .await;
    }

    pub async fn tail(&self, run_id: &str, limit: usize) -> Vec<ProgressEvent> {
        match self.log.tail(run_id, limit).await {
            Ok(events) => events,
            Err(e) => {
                warn!(run_id, error = %e, "Failed to read progress");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DbHandle;

    #[tokio::test]
    async fn test_records_lifecycle_in_order() {
        let recorder = ProgressRecorder::new(Arc::new(DbHandle::in_memory().unwrap()));
        recorder.started("run-1", Phase::Discovery, "discovery").await;
        recorder
            .completed("run-1", Phase::Discovery, "discovery", "2 segments".into())
            .await;
        recorder.started("run-2", Phase::Discovery, "discovery").await;

        let events = recorder.tail("run-1", 10).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, ProgressStatus::Started);
        assert_eq!(events[1].summary.as_deref(), Some("2 segments"));
        assert!(events[0].id < events[1].id);
    }
}
