//! The external stage that produces evidence for one phase.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::StageError;
use crate::models::{Evidence, PivotRecord, RunState};
use crate::phase::Phase;

/// Everything a stage gets to work with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRequest {
    pub run_id: String,
    pub phase: Phase,
    /// 1-based attempt within this execution, increases on retry.
    pub attempt: u32,
    /// Re-runs of this phase caused by pivots or iterate decisions.
    pub iteration: u32,
    pub project_ref: String,
    pub input: serde_json::Value,
    pub evidence: BTreeMap<Phase, Evidence>,
    pub pivot_history: Vec<PivotRecord>,
}

impl StageRequest {
    pub fn for_run(run: &RunState, attempt: u32) -> Self {
        Self {
            run_id: run.id.clone(),
            phase: run.phase,
            attempt,
            iteration: run.iterations(run.phase),
            project_ref: run.project_ref.clone(),
            input: run.input.clone(),
            evidence: run.evidence.clone(),
            pivot_history: run.pivot_history.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageFailureKind {
    Transient,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageFailure {
    pub kind: StageFailureKind,
    pub message: String,
}

/// What a command stage prints on stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StageResponse {
    Evidence { evidence: Evidence },
    Error { error: StageFailure },
}

impl StageResponse {
    pub fn into_result(self) -> Result<Evidence, StageError> {
        match self {
            StageResponse::Evidence { evidence } => Ok(evidence),
            StageResponse::Error { error } => Err(match error.kind {
                StageFailureKind::Transient => StageError::Transient(error.message),
                StageFailureKind::Fatal => StageError::Fatal(error.message),
            }),
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    /// Produce evidence for `request.phase`. Timeouts are enforced by the
    /// caller.
    async fn run(&self, request: &StageRequest) -> Result<Evidence, StageError>;
}

/// Runs an external command per phase execution.
///
/// The request is written as JSON to stdin; the command prints a
/// `StageResponse` as JSON on stdout (the last non-empty line wins when the
/// output is not a single document). `VETTER_RUN_ID` and `VETTER_PHASE` are
/// set in its environment.
pub struct CommandStage {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandStage {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

#[async_trait]
impl Stage for CommandStage {
    async fn run(&self, request: &StageRequest) -> Result<Evidence, StageError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| StageError::Fatal(format!("Failed to encode stage request: {}", e)))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("VETTER_RUN_ID", &request.run_id)
            .env("VETTER_PHASE", request.phase.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| StageError::Fatal(format!("Failed to spawn {}: {}", self.program, e)))?;

        // Stages that ignore stdin close it early; a broken pipe is not an error.
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(&payload).await;
                let _ = stdin.shutdown().await;
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| StageError::Transient(format!("Failed to wait for stage: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_response(&stdout) {
            Some(response) => response.into_result(),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = last_line(&stderr).unwrap_or("no output");
                if output.status.success() {
                    Err(StageError::Fatal(format!(
                        "Stage produced no valid response: {}",
                        detail
                    )))
                } else {
                    Err(StageError::Transient(format!(
                        "Stage exited with {}: {}",
                        output.status, detail
                    )))
                }
            }
        }
    }
}

fn parse_response(stdout: &str) -> Option<StageResponse> {
    serde_json::from_str(stdout.trim())
        .ok()
        .or_else(|| last_line(stdout).and_then(|line| serde_json::from_str(line).ok()))
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DesirabilityEvidence, ViabilityEvidence};

    fn request() -> StageRequest {
        StageRequest::for_run(
            &RunState::new("proj", "user", serde_json::json!({"idea": "x"})),
            1,
        )
    }

    #[test]
    fn test_parse_evidence_response() {
        let out = r#"{"evidence": {"phase": "desirability", "impressions": 1000, "clicks": 400, "signups": 300}}"#;
        let evidence = parse_response(out).unwrap().into_result().unwrap();
        assert_eq!(
            evidence,
            Evidence::Desirability(DesirabilityEvidence {
                impressions: 1000,
                clicks: 400,
                signups: 300,
                spend_usd: 0.0,
            })
        );
    }

    #[test]
    fn test_parse_error_response() {
        let out = "starting\n{\"error\": {\"kind\": \"transient\", \"message\": \"rate limited\"}}\n";
        let err = parse_response(out).unwrap().into_result().unwrap_err();
        assert_eq!(err, StageError::Transient("rate limited".into()));

        let out = r#"{"error": {"kind": "fatal", "message": "no market"}}"#;
        let err = parse_response(out).unwrap().into_result().unwrap_err();
        assert_eq!(err, StageError::Fatal("no market".into()));
    }

    #[test]
    fn test_garbage_is_not_a_response() {
        assert!(parse_response("").is_none());
        assert!(parse_response("hello\nworld").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_stage_reads_stdin_and_env() {
        let script = r#"read -r line; case "$line" in *'"phase":"discovery"'*) ;; *) exit 3;; esac
test "$VETTER_PHASE" = discovery || exit 4
echo "{\"evidence\": {\"phase\": \"viability\", \"ltv_usd\": 300, \"cac_usd\": 100, \"tam_usd\": 5000000}}""#;
        let stage = CommandStage::new("sh", vec!["-c".into(), script.into()]);
        let evidence = stage.run(&request()).await.unwrap();
        assert_eq!(
            evidence,
            Evidence::Viability(ViabilityEvidence {
                ltv_usd: 300.0,
                cac_usd: 100.0,
                tam_usd: 5_000_000.0,
            })
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_stage_crash_is_transient() {
        let stage = CommandStage::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 1".into()],
        );
        match stage.run(&request()).await {
            Err(StageError::Transient(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected transient error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_fatal() {
        let stage = CommandStage::new("/nonexistent/vetter-stage", Vec::new());
        assert!(matches!(
            stage.run(&request()).await,
            Err(StageError::Fatal(_))
        ));
    }
}
