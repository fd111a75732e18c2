use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sportsync_engine::generation::{GenerationError, TextGenerator};
use sportsync_engine::jobs::JobStoreError;
use sportsync_engine::prompts::PromptInstance;
use sportsync_engine::{
    spawn_recommendation_job, AnswerValue, Catalog, EngineConfig, InMemoryJobStore, JobId, JobSnapshot, JobStatus,
    JobStore, Lang, RecommendRequest, RecommendationEngine, SqliteJobStore,
};
use tempfile::tempdir;

async fn wait_for_terminal(store: &dyn JobStore, id: JobId) -> JobSnapshot {
    for _ in 0..200 {
        let snap = store.get_status(id).await.unwrap().unwrap();
        if snap.status.is_terminal() {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish");
}

fn request() -> RecommendRequest {
    let answers = [(
        "q1".to_string(),
        AnswerValue::text("quiet mornings, slow breathing and a steady aim"),
    )]
    .into_iter()
    .collect();
    RecommendRequest::new(answers, Lang::En)
}

fn engine() -> Arc<RecommendationEngine> {
    Arc::new(RecommendationEngine::new(Catalog::builtin().unwrap(), EngineConfig::default()).unwrap())
}

#[tokio::test]
async fn spawned_job_completes_with_recommendations() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let id = spawn_recommendation_job(engine(), store.clone(), request()).await.unwrap();

    let snap = wait_for_terminal(store.as_ref(), id).await;
    assert_eq!(snap.status, JobStatus::Done);
    assert!(snap.error.is_none());
    let result = snap.result.unwrap();
    assert_eq!(result["status"], "recommendations");
    assert_eq!(result["cards"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn sqlite_job_store_persists_lifecycle() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("jobs.sqlite");
    let store = SqliteJobStore::new(&db_path).unwrap();

    let id = store.create().await.unwrap();
    assert_eq!(store.get_status(id).await.unwrap().unwrap().status, JobStatus::Queued);

    store.mark_running(id).await.unwrap();
    store.set_progress(id, 0.4).await.unwrap();
    let running = store.get_status(id).await.unwrap().unwrap();
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.progress, 0.4);
    assert!(running.result.is_none());

    store.complete(id, json!({ "status": "recommendations" })).await.unwrap();

    // A second handle on the same file sees the finished job.
    let reopened = SqliteJobStore::new(&db_path).unwrap();
    let done = reopened.get_status(id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.result, Some(json!({ "status": "recommendations" })));
    assert!(done.error.is_none());

    let err = reopened.fail(id, "late".to_string()).await.unwrap_err();
    assert!(matches!(err, JobStoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn sqlite_backed_spawned_job_finishes() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(dir.path().join("jobs.sqlite")).unwrap());
    let id = spawn_recommendation_job(engine(), store.clone(), request()).await.unwrap();

    let snap = wait_for_terminal(store.as_ref(), id).await;
    assert_eq!(snap.status, JobStatus::Done);
    assert!(snap.updated_at >= snap.created_at);
}

/// Delegates to an in-memory store but rejects selected bookkeeping calls.
struct FlakyStore {
    inner: InMemoryJobStore,
    fail_running: bool,
    fail_progress: bool,
}

impl FlakyStore {
    fn new(fail_running: bool, fail_progress: bool) -> Self {
        Self {
            inner: InMemoryJobStore::new(),
            fail_running,
            fail_progress,
        }
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn create(&self) -> Result<JobId, JobStoreError> {
        self.inner.create().await
    }

    async fn mark_running(&self, id: JobId) -> Result<(), JobStoreError> {
        if self.fail_running {
            return Err(JobStoreError::Join("busy".to_string()));
        }
        self.inner.mark_running(id).await
    }

    async fn set_progress(&self, id: JobId, progress: f64) -> Result<(), JobStoreError> {
        if self.fail_progress {
            return Err(JobStoreError::Join("busy".to_string()));
        }
        self.inner.set_progress(id, progress).await
    }

    async fn get_status(&self, id: JobId) -> Result<Option<JobSnapshot>, JobStoreError> {
        self.inner.get_status(id).await
    }

    async fn complete(&self, id: JobId, result: serde_json::Value) -> Result<(), JobStoreError> {
        self.inner.complete(id, result).await
    }

    async fn fail(&self, id: JobId, error: String) -> Result<(), JobStoreError> {
        self.inner.fail(id, error).await
    }
}

#[tokio::test]
async fn failed_progress_writes_do_not_strand_the_job() {
    let store: Arc<dyn JobStore> = Arc::new(FlakyStore::new(false, true));
    let id = spawn_recommendation_job(engine(), store.clone(), request()).await.unwrap();

    let snap = wait_for_terminal(store.as_ref(), id).await;
    assert_eq!(snap.status, JobStatus::Done);
    assert_eq!(snap.result.unwrap()["status"], "recommendations");
}

#[tokio::test]
async fn failed_start_is_recorded_as_error() {
    let store: Arc<dyn JobStore> = Arc::new(FlakyStore::new(true, false));
    let id = spawn_recommendation_job(engine(), store.clone(), request()).await.unwrap();

    let snap = wait_for_terminal(store.as_ref(), id).await;
    assert_eq!(snap.status, JobStatus::Error);
    assert!(snap.error.unwrap().starts_with("job_store:"));
}

struct ExplodingGenerator;

#[async_trait]
impl TextGenerator for ExplodingGenerator {
    async fn generate(&self, _prompt: &PromptInstance) -> Result<String, GenerationError> {
        panic!("backend exploded")
    }
}

#[tokio::test]
async fn panicking_engine_marks_the_job_failed() {
    let engine = Arc::new(
        RecommendationEngine::new(Catalog::builtin().unwrap(), EngineConfig::default())
            .unwrap()
            .with_generator(Arc::new(ExplodingGenerator)),
    );
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let id = spawn_recommendation_job(engine, store.clone(), request()).await.unwrap();

    let snap = wait_for_terminal(store.as_ref(), id).await;
    assert_eq!(snap.status, JobStatus::Error);
    assert!(snap.error.unwrap().starts_with("panic"));
    assert!(snap.result.is_none());
}
