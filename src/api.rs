use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, HitlError, OrchestratorError, StoreError};
use crate::models::DecisionOption;
use crate::phase::Phase;
use crate::routing;
use crate::service::ValidationService;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: Arc<ValidationService>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct KickoffRequest {
    pub project_ref: String,
    pub user_ref: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub checkpoint: String,
    pub decision: String,
    pub notes: Option<String>,
    pub decided_by: Option<String>,
}

#[derive(Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct CheckpointView {
    pub name: &'static str,
    pub phase: Phase,
    pub options: Vec<DecisionOption>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound { .. } | StoreError::RequestNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            StoreError::RunFinalized { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<HitlError> for ApiError {
    fn from(err: HitlError) -> Self {
        match err {
            HitlError::InvalidState { .. } => ApiError::Conflict(err.to_string()),
            HitlError::InvalidDecision { .. } => ApiError::BadRequest(err.to_string()),
            HitlError::Store(e) => e.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::AlreadyTerminal { .. }
            | OrchestratorError::AwaitingApproval { .. } => ApiError::Conflict(err.to_string()),
            OrchestratorError::Persistence(e) => e.into(),
            OrchestratorError::Hitl(e) => e.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::UnknownCheckpoint(_) | DispatchError::InvalidDecision { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            DispatchError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DispatchError::AlreadyDecided { .. } | DispatchError::NotAwaiting { .. } => {
                ApiError::Conflict(err.to_string())
            }
            DispatchError::Hitl(e) => e.into(),
            DispatchError::Store(e) => e.into(),
            DispatchError::Orchestrator(e) => e.into(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/runs", get(list_runs).post(kickoff_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/decisions", post(submit_decision))
        .route("/api/runs/{id}/fail", post(fail_run))
        .route("/api/hitl/sweep", post(sweep_expired))
        .route("/api/checkpoints", get(list_checkpoints))
        .route("/healthz", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn kickoff_run(
    State(state): State<SharedState>,
    Json(req): Json<KickoffRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.project_ref.trim().is_empty() || req.user_ref.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "project_ref and user_ref are required".into(),
        ));
    }
    let run_id = state
        .service
        .kickoff_detached(&req.project_ref, &req.user_ref, req.input)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"run_id": run_id})),
    ))
}

async fn list_runs(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = state.service.list(query.limit.unwrap_or(50)).await?;
    Ok(Json(runs))
}

async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.service.status(&id).await?;
    Ok(Json(view))
}

async fn submit_decision(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .service
        .submit_decision(&id, &req.checkpoint, &req.decision, req.notes, req.decided_by)
        .await?;
    Ok(Json(outcome))
}

async fn fail_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<FailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.service.fail_run(&id, &req.reason).await?;
    Ok(Json(outcome))
}

async fn sweep_expired(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let expired = state.service.sweep().await?;
    Ok(Json(serde_json::json!({"expired": expired})))
}

async fn list_checkpoints() -> Json<Vec<CheckpointView>> {
    Json(
        routing::checkpoints()
            .iter()
            .map(|cp| CheckpointView {
                name: cp.name,
                phase: cp.phase,
                options: cp.decision_options(),
            })
            .collect(),
    )
}
