//! Durable state for runs, approval requests and progress events.
//!
//! Components depend on the traits below; [`DbHandle`] implements all three
//! over a single SQLite connection.

mod db;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::models::{
    HitlRequest, HitlStatus, NewHitlRequest, NewProgressEvent, ProgressEvent, RunState,
};

pub use db::{DbHandle, VetterDb};

/// Load/save of a run's full state, keyed by run id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Idempotent upsert of the whole state.
    async fn save(&self, state: &RunState) -> Result<(), StoreError>;

    /// `StoreError::RunNotFound` when the id is unknown.
    async fn load(&self, run_id: &str) -> Result<RunState, StoreError>;

    /// Most recently created runs first.
    async fn list(&self, limit: usize) -> Result<Vec<RunState>, StoreError>;
}

/// Decision fields written by a successful resolve.
#[derive(Debug, Clone)]
pub struct Resolve {
    pub status: HitlStatus,
    pub decision: String,
    pub notes: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[async_trait]
pub trait HitlStore: Send + Sync {
    /// Expire any pending request for the same (run, checkpoint) and insert
    /// the new one, in one transaction.
    async fn insert_superseding(
        &self,
        request: NewHitlRequest,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<HitlRequest, StoreError>;

    /// `StoreError::RequestNotFound` when the id is unknown.
    async fn get(&self, request_id: &str) -> Result<HitlRequest, StoreError>;

    async fn pending_for(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, StoreError>;

    /// Newest request for (run, checkpoint) in any status.
    async fn latest_for(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, StoreError>;

    /// Newest pending request of a run at any checkpoint.
    async fn pending_for_run(&self, run_id: &str) -> Result<Option<HitlRequest>, StoreError>;

    /// Conditional update; false when the request was no longer pending.
    async fn resolve_if_pending(
        &self,
        request_id: &str,
        resolve: Resolve,
    ) -> Result<bool, StoreError>;

    /// Expire every pending request of a run. Returns the count.
    async fn expire_for_run(&self, run_id: &str) -> Result<usize, StoreError>;

    /// Expire pending requests created before `cutoff`. Returns the count.
    async fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Append-only lifecycle log.
#[async_trait]
pub trait ProgressLog: Send + Sync {
    async fn append(&self, event: NewProgressEvent) -> Result<ProgressEvent, StoreError>;

    /// Last `limit` events of a run, oldest first.
    async fn tail(&self, run_id: &str, limit: usize) -> Result<Vec<ProgressEvent>, StoreError>;
}
