use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{CheckpointStore, HitlStore, ProgressLog, Resolve};
use crate::errors::StoreError;
use crate::models::*;
use crate::phase::Phase;

/// Async-safe handle to the vetter database.
///
/// Wraps `VetterDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<VetterDb>>,
}

impl DbHandle {
    pub fn new(db: VetterDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(VetterDb::new(path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(VetterDb::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&VetterDb) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Database(anyhow::anyhow!("DB task panicked: {}", e)))?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, VetterDb>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

pub struct VetterDb {
    conn: Connection,
}

impl VetterDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(anyhow::anyhow!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.run_migrations()
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                project_ref TEXT NOT NULL,
                user_ref TEXT NOT NULL,
                phase TEXT NOT NULL,
                status TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS hitl_requests (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                checkpoint_name TEXT NOT NULL,
                phase TEXT NOT NULL,
                context TEXT NOT NULL,
                options TEXT NOT NULL,
                recommended_option TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                decision TEXT,
                decision_notes TEXT,
                decided_by TEXT,
                decided_at TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS progress_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                summary TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_status_phase ON runs(status, phase);
            CREATE INDEX IF NOT EXISTS idx_hitl_run ON hitl_requests(run_id, checkpoint_name);
            CREATE INDEX IF NOT EXISTS idx_hitl_status_created ON hitl_requests(status, created_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_hitl_one_pending
                ON hitl_requests(run_id, checkpoint_name)
                WHERE status = 'pending';
            CREATE INDEX IF NOT EXISTS idx_progress_run ON progress_events(run_id, created_at);

            CREATE TRIGGER IF NOT EXISTS progress_events_no_update
                BEFORE UPDATE ON progress_events
            BEGIN
                SELECT RAISE(ABORT, 'progress_events is append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS progress_events_no_delete
                BEFORE DELETE ON progress_events
            BEGIN
                SELECT RAISE(ABORT, 'progress_events is append-only');
            END;
            ",
        )?;
        Ok(())
    }

    // ── Runs ──────────────────────────────────────────────────────────

    /// Insert or update a run. A row that is already completed or failed is
    /// never overwritten.
    pub fn save_run(&self, state: &RunState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state).map_err(|e| corrupt(&state.id, e))?;
        let changed = self.conn.execute(
            "INSERT INTO runs (id, project_ref, user_ref, phase, status, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                phase = excluded.phase,
                status = excluded.status,
                state = excluded.state,
                updated_at = excluded.updated_at
             WHERE runs.status NOT IN ('completed', 'failed')",
            params![
                state.id,
                state.project_ref,
                state.user_ref,
                state.phase.as_str(),
                state.status.as_str(),
                json,
                encode_time(&state.created_at),
                encode_time(&state.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::RunFinalized {
                run_id: state.id.clone(),
            });
        }
        Ok(())
    }

    pub fn load_run(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(|e| corrupt(run_id, e)))
            .transpose()
    }

    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunState>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, state FROM runs ORDER BY created_at DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut runs = Vec::new();
        for row in rows {
            let (id, json) = row?;
            runs.push(serde_json::from_str(&json).map_err(|e| corrupt(&id, e))?);
        }
        Ok(runs)
    }

    // ── Approval requests ─────────────────────────────────────────────

    pub fn insert_superseding(
        &self,
        request: &NewHitlRequest,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<HitlRequest, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let context = serde_json::to_string(&request.context).map_err(|e| corrupt(&id, e))?;
        let options = serde_json::to_string(&request.options).map_err(|e| corrupt(&id, e))?;

        let tx = self.conn.unchecked_transaction()?;
        let superseded = tx.execute(
            "UPDATE hitl_requests SET status = 'expired'
             WHERE run_id = ?1 AND checkpoint_name = ?2 AND status = 'pending'",
            params![request.run_id, request.checkpoint_name],
        )?;
        tx.execute(
            "INSERT INTO hitl_requests
                (id, run_id, checkpoint_name, phase, context, options, recommended_option,
                 status, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9)",
            params![
                id,
                request.run_id,
                request.checkpoint_name,
                request.phase.as_str(),
                context,
                options,
                request.recommended_option,
                encode_time(&created_at),
                encode_time(&expires_at),
            ],
        )?;
        tx.commit()?;

        if superseded > 0 {
            tracing::debug!(
                run_id = %request.run_id,
                checkpoint = %request.checkpoint_name,
                superseded,
                "Expired superseded approval request"
            );
        }

        self.get_request(&id)?
            .ok_or(StoreError::RequestNotFound { request_id: id })
    }

    pub fn get_request(&self, request_id: &str) -> Result<Option<HitlRequest>, StoreError> {
        self.query_request(
            &format!("SELECT {} FROM hitl_requests WHERE id = ?1", REQUEST_COLUMNS),
            params![request_id],
        )
    }

    pub fn pending_request(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, StoreError> {
        self.query_request(
            &format!(
                "SELECT {} FROM hitl_requests
                 WHERE run_id = ?1 AND checkpoint_name = ?2 AND status = 'pending'",
                REQUEST_COLUMNS
            ),
            params![run_id, checkpoint],
        )
    }

    pub fn latest_request(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, StoreError> {
        self.query_request(
            &format!(
                "SELECT {} FROM hitl_requests
                 WHERE run_id = ?1 AND checkpoint_name = ?2
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                REQUEST_COLUMNS
            ),
            params![run_id, checkpoint],
        )
    }

    pub fn pending_request_for_run(&self, run_id: &str) -> Result<Option<HitlRequest>, StoreError> {
        self.query_request(
            &format!(
                "SELECT {} FROM hitl_requests
                 WHERE run_id = ?1 AND status = 'pending'
                 ORDER BY created_at DESC LIMIT 1",
                REQUEST_COLUMNS
            ),
            params![run_id],
        )
    }

    pub fn resolve_if_pending(&self, request_id: &str, resolve: &Resolve) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE hitl_requests
             SET status = ?2, decision = ?3, decision_notes = ?4, decided_by = ?5, decided_at = ?6
             WHERE id = ?1 AND status = 'pending'",
            params![
                request_id,
                resolve.status.as_str(),
                resolve.decision,
                resolve.notes,
                resolve.decided_by,
                encode_time(&resolve.decided_at),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn expire_for_run(&self, run_id: &str) -> Result<usize, StoreError> {
        let expired = self.conn.execute(
            "UPDATE hitl_requests SET status = 'expired'
             WHERE run_id = ?1 AND status = 'pending'",
            params![run_id],
        )?;
        Ok(expired)
    }

    pub fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let expired = self.conn.execute(
            "UPDATE hitl_requests SET status = 'expired'
             WHERE status = 'pending' AND created_at < ?1",
            params![encode_time(&cutoff)],
        )?;
        Ok(expired)
    }

    fn query_request(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<HitlRequest>, StoreError> {
        let row = self
            .conn
            .query_row(sql, params, RequestRow::from_row)
            .optional()?;
        row.map(RequestRow::into_request).transpose()
    }

    // ── Progress events ───────────────────────────────────────────────

    pub fn append_progress(&self, event: &NewProgressEvent) -> Result<ProgressEvent, StoreError> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO progress_events (run_id, phase, stage, status, summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.run_id,
                event.phase.as_str(),
                event.stage,
                event.status.as_str(),
                event.summary,
                encode_time(&created_at),
            ],
        )?;
        Ok(ProgressEvent {
            id: self.conn.last_insert_rowid(),
            run_id: event.run_id.clone(),
            phase: event.phase,
            stage: event.stage.clone(),
            status: event.status,
            summary: event.summary.clone(),
            created_at,
        })
    }

    pub fn progress_tail(&self, run_id: &str, limit: usize) -> Result<Vec<ProgressEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, phase, stage, status, summary, created_at
             FROM progress_events WHERE run_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![run_id, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (id, run_id, phase, stage, status, summary, created_at) = row?;
            let key = format!("progress_events/{}", id);
            events.push(ProgressEvent {
                id,
                run_id,
                phase: phase.parse::<Phase>().map_err(|e| corrupt(&key, e))?,
                stage,
                status: status
                    .parse::<ProgressStatus>()
                    .map_err(|e| corrupt(&key, e))?,
                summary,
                created_at: decode_time(&key, &created_at)?,
            });
        }
        events.reverse();
        Ok(events)
    }
}

const REQUEST_COLUMNS: &str = "id, run_id, checkpoint_name, phase, context, options, \
     recommended_option, status, decision, decision_notes, decided_by, decided_at, \
     created_at, expires_at";

/// Raw column values of an approval request, before decoding.
struct RequestRow {
    id: String,
    run_id: String,
    checkpoint_name: String,
    phase: String,
    context: String,
    options: String,
    recommended_option: String,
    status: String,
    decision: Option<String>,
    decision_notes: Option<String>,
    decided_by: Option<String>,
    decided_at: Option<String>,
    created_at: String,
    expires_at: String,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            checkpoint_name: row.get(2)?,
            phase: row.get(3)?,
            context: row.get(4)?,
            options: row.get(5)?,
            recommended_option: row.get(6)?,
            status: row.get(7)?,
            decision: row.get(8)?,
            decision_notes: row.get(9)?,
            decided_by: row.get(10)?,
            decided_at: row.get(11)?,
            created_at: row.get(12)?,
            expires_at: row.get(13)?,
        })
    }

    fn into_request(self) -> Result<HitlRequest, StoreError> {
        let key = self.id.as_str();
        Ok(HitlRequest {
            phase: self.phase.parse::<Phase>().map_err(|e| corrupt(key, e))?,
            context: serde_json::from_str(&self.context).map_err(|e| corrupt(key, e))?,
            options: serde_json::from_str(&self.options).map_err(|e| corrupt(key, e))?,
            status: self.status.parse::<HitlStatus>().map_err(|e| corrupt(key, e))?,
            decided_at: self
                .decided_at
                .as_deref()
                .map(|t| decode_time(key, t))
                .transpose()?,
            created_at: decode_time(key, &self.created_at)?,
            expires_at: decode_time(key, &self.expires_at)?,
            id: self.id.clone(),
            run_id: self.run_id,
            checkpoint_name: self.checkpoint_name,
            recommended_option: self.recommended_option,
            decision: self.decision,
            decision_notes: self.decision_notes,
            decided_by: self.decided_by,
        })
    }
}

/// Fixed-width UTC timestamps so that string order matches time order.
fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(key: &str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(key, e))
}

fn corrupt(key: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        message: err.to_string(),
    }
}

// ── Trait implementations ─────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for DbHandle {
    async fn save(&self, state: &RunState) -> Result<(), StoreError> {
        let state = state.clone();
        self.call(move |db| db.save_run(&state)).await
    }

    async fn load(&self, run_id: &str) -> Result<RunState, StoreError> {
        let id = run_id.to_string();
        self.call(move |db| db.load_run(&id))
            .await?
            .ok_or_else(|| StoreError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn list(&self, limit: usize) -> Result<Vec<RunState>, StoreError> {
        self.call(move |db| db.list_runs(limit)).await
    }
}

#[async_trait]
impl HitlStore for DbHandle {
    async fn insert_superseding(
        &self,
        request: NewHitlRequest,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<HitlRequest, StoreError> {
        self.call(move |db| db.insert_superseding(&request, created_at, expires_at))
            .await
    }

    async fn get(&self, request_id: &str) -> Result<HitlRequest, StoreError> {
        let id = request_id.to_string();
        self.call(move |db| db.get_request(&id))
            .await?
            .ok_or_else(|| StoreError::RequestNotFound {
                request_id: request_id.to_string(),
            })
    }

    async fn pending_for(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, StoreError> {
        let (run_id, checkpoint) = (run_id.to_string(), checkpoint.to_string());
        self.call(move |db| db.pending_request(&run_id, &checkpoint))
            .await
    }

    async fn latest_for(
        &self,
        run_id: &str,
        checkpoint: &str,
    ) -> Result<Option<HitlRequest>, StoreError> {
        let (run_id, checkpoint) = (run_id.to_string(), checkpoint.to_string());
        self.call(move |db| db.latest_request(&run_id, &checkpoint))
            .await
    }

    async fn pending_for_run(&self, run_id: &str) -> Result<Option<HitlRequest>, StoreError> {
        let run_id = run_id.to_string();
        self.call(move |db| db.pending_request_for_run(&run_id))
            .await
    }

    async fn resolve_if_pending(
        &self,
        request_id: &str,
        resolve: Resolve,
    ) -> Result<bool, StoreError> {
        let id = request_id.to_string();
        self.call(move |db| db.resolve_if_pending(&id, &resolve))
            .await
    }

    async fn expire_for_run(&self, run_id: &str) -> Result<usize, StoreError> {
        let run_id = run_id.to_string();
        self.call(move |db| db.expire_for_run(&run_id)).await
    }

    async fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.call(move |db| db.expire_pending_before(cutoff)).await
    }
}

#[async_trait]
impl ProgressLog for DbHandle {
    async fn append(&self, event: NewProgressEvent) -> Result<ProgressEvent, StoreError> {
        self.call(move |db| db.append_progress(&event)).await
    }

    async fn tail(&self, run_id: &str, limit: usize) -> Result<Vec<ProgressEvent>, StoreError> {
        let run_id = run_id.to_string();
        self.call(move |db| db.progress_tail(&run_id, limit)).await
    }
}
