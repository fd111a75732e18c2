//! Background recommendation jobs with pollable status.
//!
//! A job is `queued`, then `running`, then either `done` or `error`. Results and
//! errors become visible only in their terminal state. Jobs cannot be
//! cancelled: a caller that stops polling does not stop the job.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{RecommendRequest, RecommendationEngine};

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// What a poller sees. `result` is set only when done, `error` only on error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: &'static str,
        to: &'static str,
    },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self) -> Result<JobId, JobStoreError>;
    async fn mark_running(&self, id: JobId) -> Result<(), JobStoreError>;
    /// Progress in `[0, 1]`; ignored once the job is terminal.
    async fn set_progress(&self, id: JobId, progress: f64) -> Result<(), JobStoreError>;
    async fn get_status(&self, id: JobId) -> Result<Option<JobSnapshot>, JobStoreError>;
    async fn complete(&self, id: JobId, result: serde_json::Value) -> Result<(), JobStoreError>;
    async fn fail(&self, id: JobId, error: String) -> Result<(), JobStoreError>;
}

/// Stored form of a job. Both payload fields may be set internally; the
/// snapshot decides what is exposed.
#[derive(Debug, Clone)]
struct JobRecord {
    status: JobStatus,
    progress: f64,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl JobRecord {
    fn queued(now: i64) -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0.0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn snapshot(&self, job_id: JobId) -> JobSnapshot {
        JobSnapshot {
            job_id,
            status: self.status,
            progress: self.progress,
            result: if self.status == JobStatus::Done { self.result.clone() } else { None },
            error: if self.status == JobStatus::Error { self.error.clone() } else { None },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn check_transition(id: JobId, from: JobStatus, to: JobStatus) -> Result<(), JobStoreError> {
    let allowed = match to {
        JobStatus::Running => from == JobStatus::Queued,
        JobStatus::Done | JobStatus::Error => !from.is_terminal(),
        JobStatus::Queued => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(JobStoreError::InvalidTransition {
            job_id: id,
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Finished jobs an in-memory store keeps before dropping the oldest.
pub const DEFAULT_RETAINED_FINISHED_JOBS: usize = 1024;

#[derive(Default)]
struct JobTable {
    records: HashMap<JobId, JobRecord>,
    /// Terminal job ids, oldest first.
    finished: VecDeque<JobId>,
}

/// Process-local store. Live jobs are always kept; finished jobs are dropped
/// oldest first once more than `retain_finished` of them exist.
pub struct InMemoryJobStore {
    jobs: Mutex<JobTable>,
    retain_finished: usize,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_FINISHED_JOBS)
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            jobs: Mutex::new(JobTable::default()),
            retain_finished: retain_finished.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.table().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> std::sync::MutexGuard<'_, JobTable> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F>(&self, id: JobId, f: F) -> Result<(), JobStoreError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), JobStoreError>,
    {
        let mut table = self.table();
        let record = table.records.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        let was_terminal = record.status.is_terminal();
        f(record)?;
        record.updated_at = now_epoch_ms();
        if !was_terminal && record.status.is_terminal() {
            table.finished.push_back(id);
            while table.finished.len() > self.retain_finished {
                if let Some(oldest) = table.finished.pop_front() {
                    table.records.remove(&oldest);
                    debug!(job_id = %oldest, "finished job evicted");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self) -> Result<JobId, JobStoreError> {
        let id = Uuid::new_v4();
        self.table().records.insert(id, JobRecord::queued(now_epoch_ms()));
        Ok(id)
    }

    async fn mark_running(&self, id: JobId) -> Result<(), JobStoreError> {
        self.update(id, |r| {
            check_transition(id, r.status, JobStatus::Running)?;
            r.status = JobStatus::Running;
            Ok(())
        })
    }

    async fn set_progress(&self, id: JobId, progress: f64) -> Result<(), JobStoreError> {
        self.update(id, |r| {
            if !r.status.is_terminal() {
                r.progress = progress.clamp(0.0, 1.0);
            }
            Ok(())
        })
    }

    async fn get_status(&self, id: JobId) -> Result<Option<JobSnapshot>, JobStoreError> {
        Ok(self.table().records.get(&id).map(|r| r.snapshot(id)))
    }

    async fn complete(&self, id: JobId, result: serde_json::Value) -> Result<(), JobStoreError> {
        self.update(id, |r| {
            check_transition(id, r.status, JobStatus::Done)?;
            r.status = JobStatus::Done;
            r.progress = 1.0;
            r.result = Some(result);
            Ok(())
        })
    }

    async fn fail(&self, id: JobId, error: String) -> Result<(), JobStoreError> {
        self.update(id, |r| {
            check_transition(id, r.status, JobStatus::Error)?;
            r.status = JobStatus::Error;
            r.error = Some(error);
            Ok(())
        })
    }
}

// =============================================================================
// SQLITE
// =============================================================================

#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, JobStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             PRAGMA busy_timeout=5000; \
             CREATE TABLE IF NOT EXISTS jobs (\
               job_id TEXT PRIMARY KEY, \
               status TEXT NOT NULL DEFAULT 'queued', \
               progress REAL NOT NULL DEFAULT 0, \
               result TEXT, \
               error TEXT, \
               created_at INTEGER NOT NULL, \
               updated_at INTEGER NOT NULL \
             );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("SPORTSYNC_JOBS_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".sportsync_jobs.sqlite")
    }

    /// The SQLite connection is still usable after a panic elsewhere, so poisoning is recovered.
    fn with_conn<F, R>(&self, f: F) -> Result<R, JobStoreError>
    where
        F: FnOnce(&Connection) -> Result<R, JobStoreError>,
    {
        let guard = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    async fn blocking<F, R>(&self, f: F) -> Result<R, JobStoreError>
    where
        F: FnOnce(&Connection) -> Result<R, JobStoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| JobStoreError::Join(e.to_string()))?
    }
}

fn load_record(conn: &Connection, id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
    let row = conn
        .query_row(
            "SELECT status, progress, result, error, created_at, updated_at FROM jobs WHERE job_id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((status, progress, result, error, created_at, updated_at)) = row else {
        return Ok(None);
    };
    let status = JobStatus::from_str(&status)
        .ok_or_else(|| JobStoreError::Serde(format!("unknown job status: {status}")))?;
    let result = result
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| JobStoreError::Serde(e.to_string()))?;
    Ok(Some(JobRecord {
        status,
        progress,
        result,
        error,
        created_at,
        updated_at,
    }))
}

fn transition(conn: &Connection, id: JobId, to: JobStatus) -> Result<(), JobStoreError> {
    let record = load_record(conn, id)?.ok_or(JobStoreError::NotFound(id))?;
    check_transition(id, record.status, to)
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self) -> Result<JobId, JobStoreError> {
        let id = Uuid::new_v4();
        self.blocking(move |conn| {
            let now = now_epoch_ms();
            conn.execute(
                "INSERT INTO jobs (job_id, status, progress, created_at, updated_at) VALUES (?1, 'queued', 0, ?2, ?2)",
                params![id.to_string(), now],
            )?;
            Ok(id)
        })
        .await
    }

    async fn mark_running(&self, id: JobId) -> Result<(), JobStoreError> {
        self.blocking(move |conn| {
            transition(conn, id, JobStatus::Running)?;
            conn.execute(
                "UPDATE jobs SET status = 'running', updated_at = ?1 WHERE job_id = ?2",
                params![now_epoch_ms(), id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_progress(&self, id: JobId, progress: f64) -> Result<(), JobStoreError> {
        let progress = progress.clamp(0.0, 1.0);
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE jobs SET progress = ?1, updated_at = ?2 \
                 WHERE job_id = ?3 AND status IN ('queued', 'running')",
                params![progress, now_epoch_ms(), id.to_string()],
            )?;
            if updated == 0 && load_record(conn, id)?.is_none() {
                return Err(JobStoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn get_status(&self, id: JobId) -> Result<Option<JobSnapshot>, JobStoreError> {
        self.blocking(move |conn| Ok(load_record(conn, id)?.map(|r| r.snapshot(id))))
            .await
    }

    async fn complete(&self, id: JobId, result: serde_json::Value) -> Result<(), JobStoreError> {
        let raw = serde_json::to_string(&result).map_err(|e| JobStoreError::Serde(e.to_string()))?;
        self.blocking(move |conn| {
            transition(conn, id, JobStatus::Done)?;
            conn.execute(
                "UPDATE jobs SET status = 'done', progress = 1, result = ?1, updated_at = ?2 WHERE job_id = ?3",
                params![raw, now_epoch_ms(), id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn fail(&self, id: JobId, error: String) -> Result<(), JobStoreError> {
        self.blocking(move |conn| {
            transition(conn, id, JobStatus::Error)?;
            conn.execute(
                "UPDATE jobs SET status = 'error', error = ?1, updated_at = ?2 WHERE job_id = ?3",
                params![error, now_epoch_ms(), id.to_string()],
            )?;
            Ok(())
        })
        .await
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Queue a recommendation and run it on a tokio task. Returns as soon as the
/// job is recorded; poll `store.get_status` for the outcome.
///
/// Once queued, the job always ends in `done` or `error` unless the store
/// itself rejects the final write.
pub async fn spawn_recommendation_job(
    engine: Arc<RecommendationEngine>,
    store: Arc<dyn JobStore>,
    request: RecommendRequest,
) -> Result<JobId, JobStoreError> {
    let id = store.create().await?;
    debug!(job_id = %id, "job queued");

    tokio::spawn(async move {
        let outcome = run_job(engine, store.as_ref(), id, request).await;
        if let Err(err) = settle(store.as_ref(), id, outcome).await {
            warn!(job_id = %id, error = %err, "job outcome could not be recorded");
        }
    });
    Ok(id)
}

/// Run one job up to its final payload. `Err` carries the message to record.
async fn run_job(
    engine: Arc<RecommendationEngine>,
    store: &dyn JobStore,
    id: JobId,
    request: RecommendRequest,
) -> Result<serde_json::Value, String> {
    store
        .mark_running(id)
        .await
        .map_err(|err| format!("job_store: {err}"))?;
    debug!(job_id = %id, "job running");
    if let Err(err) = store.set_progress(id, 0.1).await {
        warn!(job_id = %id, error = %err, "progress update failed");
    }

    // A panic inside the engine ends only the inner task.
    let work = tokio::spawn(async move { engine.recommend(request).await });
    match work.await {
        Ok(Ok(outcome)) => serde_json::to_value(&outcome).map_err(|err| format!("serialization: {err}")),
        Ok(Err(err)) => Err(format!("{}: {err}", err.code())),
        Err(join) if join.is_panic() => Err("panic: recommendation task panicked".to_string()),
        Err(join) => Err(format!("join: {join}")),
    }
}

/// Record the terminal state. A failed `complete` is retried as `fail`.
async fn settle(
    store: &dyn JobStore,
    id: JobId,
    outcome: Result<serde_json::Value, String>,
) -> Result<(), JobStoreError> {
    let message = match outcome {
        Ok(value) => match store.complete(id, value).await {
            Ok(()) => {
                debug!(job_id = %id, "job done");
                return Ok(());
            }
            Err(err) => format!("job_store: {err}"),
        },
        Err(message) => message,
    };
    debug!(job_id = %id, error = %message, "job failed");
    store.fail(id, message).await
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_through_str() {
        for status in [JobStatus::Queued, JobStatus::Running, JobStatus::Done, JobStatus::Error] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_str("cancelled"), None);
    }

    #[tokio::test]
    async fn in_memory_hides_result_until_done() {
        let store = InMemoryJobStore::new();
        let id = store.create().await.unwrap();
        let queued = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(queued.status, JobStatus::Queued);
        assert!(queued.result.is_none());

        store.mark_running(id).await.unwrap();
        store.set_progress(id, 0.5).await.unwrap();
        let running = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(running.progress, 0.5);
        assert!(running.result.is_none() && running.error.is_none());

        store.complete(id, json!({"ok": true})).await.unwrap();
        let done = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.result, Some(json!({"ok": true})));
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_transitions() {
        let store = InMemoryJobStore::new();
        let id = store.create().await.unwrap();
        store.mark_running(id).await.unwrap();
        store.fail(id, "boom".into()).await.unwrap();

        let err = store.complete(id, json!(null)).await.unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidTransition { from: "error", to: "done", .. }));
        let snap = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(snap.error.as_deref(), Some("boom"));
        assert!(snap.result.is_none());
    }

    #[tokio::test]
    async fn in_memory_store_drops_oldest_finished_jobs_only() {
        let store = InMemoryJobStore::with_retention(2);
        let live = store.create().await.unwrap();
        store.mark_running(live).await.unwrap();

        let mut finished = Vec::new();
        for n in 0..3 {
            let id = store.create().await.unwrap();
            store.complete(id, json!(n)).await.unwrap();
            finished.push(id);
        }

        assert_eq!(store.len(), 3);
        assert!(store.get_status(finished[0]).await.unwrap().is_none());
        assert_eq!(store.get_status(finished[2]).await.unwrap().unwrap().result, Some(json!(2)));
        assert_eq!(store.get_status(live).await.unwrap().unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        assert!(store.get_status(id).await.unwrap().is_none());
        assert!(matches!(store.mark_running(id).await, Err(JobStoreError::NotFound(_))));
    }
}
