//! Typed error hierarchy for the validation orchestrator.
//!
//! One enum per seam:
//! - `StoreError`: persistence of runs, approval requests and progress
//! - `StageError`: failures reported by (or around) an external stage
//! - `HitlError`: approval request lifecycle violations
//! - `OrchestratorError`: phase execution failures
//! - `DispatchError`: applying a human decision to a paused run

use thiserror::Error;

use crate::models::{HitlStatus, RunStatus};
use crate::phase::Phase;

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run {run_id} not found")]
    RunNotFound { run_id: String },

    #[error("Approval request {request_id} not found")]
    RequestNotFound { request_id: String },

    #[error("Run {run_id} already reached a terminal status")]
    RunFinalized { run_id: String },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Corrupt record {key}: {message}")]
    Corrupt { key: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.into())
    }
}

/// Errors returned by a stage invocation.
///
/// Only `Transient` and `Timeout` are retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    #[error("Transient stage failure: {0}")]
    Transient(String),

    #[error("Stage exceeded its {secs}s budget")]
    Timeout { secs: u64 },

    #[error("Stage failed: {0}")]
    Fatal(String),

    #[error("Stage for {expected} returned evidence for {actual}")]
    WrongPhase { expected: Phase, actual: Phase },
}

impl StageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Transient(_) | StageError::Timeout { .. })
    }
}

/// Errors from the approval gateway.
#[derive(Debug, Error)]
pub enum HitlError {
    #[error("Approval request {request_id} is {status}, decisions are single-use")]
    InvalidState {
        request_id: String,
        status: HitlStatus,
    },

    #[error("Decision '{decision}' is not an option for checkpoint {checkpoint}")]
    InvalidDecision {
        checkpoint: String,
        decision: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from a phase execution.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Run {run_id} is already {status}")]
    AlreadyTerminal { run_id: String, status: RunStatus },

    #[error("Run {run_id} is awaiting approval at {checkpoint}")]
    AwaitingApproval { run_id: String, checkpoint: String },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Hitl(#[from] HitlError),
}

/// Errors from applying a human decision.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown checkpoint '{0}'")]
    UnknownCheckpoint(String),

    #[error("Decision '{decision}' is not valid for checkpoint {checkpoint}")]
    InvalidDecision {
        checkpoint: String,
        decision: String,
    },

    #[error("No approval request for run {run_id} at {checkpoint}")]
    NotFound { run_id: String, checkpoint: String },

    #[error("Approval at {checkpoint} was already {status}")]
    AlreadyDecided {
        checkpoint: String,
        status: HitlStatus,
    },

    #[error("Run {run_id} is {status}, not awaiting approval at {checkpoint}")]
    NotAwaiting {
        run_id: String,
        status: RunStatus,
        checkpoint: String,
    },

    #[error(transparent)]
    Hitl(#[from] HitlError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl DispatchError {
    /// True for errors caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        match self {
            DispatchError::UnknownCheckpoint(_)
            | DispatchError::InvalidDecision { .. }
            | DispatchError::NotFound { .. }
            | DispatchError::AlreadyDecided { .. }
            | DispatchError::NotAwaiting { .. } => true,
            DispatchError::Hitl(HitlError::InvalidState { .. })
            | DispatchError::Hitl(HitlError::InvalidDecision { .. }) => true,
            DispatchError::Store(StoreError::RunNotFound { .. }) => true,
            _ => false,
        }
    }
}
