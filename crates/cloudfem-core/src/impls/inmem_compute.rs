//! InMemoryCompute - 開発用のリモート計算サービス
//!
//! # 実装詳細
//! - バケットとタスクを `Mutex` 配下に保持し、接続ハンドルは状態を共有する
//! - `wait` は設定回数だけ「未完了」を返してから成功/失敗で終了する
//! - 結果のダウンロードは実ファイルを書き出す
//! - 各種エラーを事前に仕込める（テスト用）
//!
//! ロックを `.await` を跨いで保持しないこと。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::config::credential::Credential;
use crate::domain::errors::RemoteError;
use crate::domain::ids::{BucketId, RemoteTaskId};
use crate::domain::metadata::Constants;
use crate::ports::compute::{
    ComputeConnection, Connector, RemoteTask, RemoteTaskState, TaskDraft, TaskOutput,
};
use crate::ports::id_generator::{IdGenerator, UlidGenerator};
use crate::ports::SystemClock;

/// File written into the working directory by `download_results`.
pub const RESULT_FILE: &str = "results.txt";

struct StoredBucket {
    id: BucketId,
    name: String,
    files: Vec<String>,
}

struct SimTask {
    task: RemoteTask,
    /// `wait` calls still answering "not done".
    pending_waits: u32,
    failure: Option<String>,
}

#[derive(Default)]
struct ComputeState {
    buckets: Vec<StoredBucket>,
    tasks: Vec<SimTask>,

    waits_until_done: u32,
    failure: Option<String>,
    submit_error: Option<RemoteError>,
    abort_error: Option<RemoteError>,
    download_error: Option<RemoteError>,
    list_error: Option<RemoteError>,

    wait_calls: usize,
    abort_calls: usize,
}

impl ComputeState {
    fn task_mut(&mut self, id: &RemoteTaskId) -> Result<&mut SimTask, RemoteError> {
        self.tasks
            .iter_mut()
            .find(|t| &t.task.id == id)
            .ok_or_else(|| RemoteError::UnknownTask(id.clone()))
    }

    fn bucket_mut(&mut self, id: &BucketId) -> Result<&mut StoredBucket, RemoteError> {
        self.buckets
            .iter_mut()
            .find(|b| &b.id == id)
            .ok_or_else(|| RemoteError::Storage(format!("unknown bucket {id}")))
    }
}

/// In-memory compute service. Clones share the same state.
#[derive(Clone)]
pub struct InMemoryCompute {
    state: Arc<Mutex<ComputeState>>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryCompute {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ComputeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A connection without going through credential checks.
    pub fn connection(&self) -> Arc<dyn ComputeConnection> {
        Arc::new(InMemoryConnection {
            service: self.clone(),
        })
    }

    /// Number of `wait` calls answering "not done" before a task concludes.
    pub fn set_waits_until_done(&self, n: u32) {
        self.lock().waits_until_done = n;
    }

    /// Tasks submitted from now on fail with `message`.
    pub fn fail_next_tasks(&self, message: Option<&str>) {
        self.lock().failure = message.map(str::to_string);
    }

    pub fn set_submit_error(&self, err: Option<RemoteError>) {
        self.lock().submit_error = err;
    }

    pub fn set_abort_error(&self, err: Option<RemoteError>) {
        self.lock().abort_error = err;
    }

    pub fn set_download_error(&self, err: Option<RemoteError>) {
        self.lock().download_error = err;
    }

    pub fn set_list_error(&self, err: Option<RemoteError>) {
        self.lock().list_error = err;
    }

    /// Register a task as if an earlier session had submitted it.
    pub fn seed_task(&self, name: &str, tags: &[&str], constants: Constants) -> RemoteTaskId {
        let id = self.ids.generate_task_id();
        let input = self.ids.generate_bucket_id();
        let output = self.ids.generate_bucket_id();
        let mut state = self.lock();
        for (bucket, prefix) in [(&input, "input-resource"), (&output, "output")] {
            state.buckets.push(StoredBucket {
                id: bucket.clone(),
                name: format!("{prefix}-{name}-{}", bucket.as_str()),
                files: Vec::new(),
            });
        }
        state.tasks.push(SimTask {
            task: RemoteTask {
                id: id.clone(),
                name: name.to_string(),
                state: RemoteTaskState::Executing,
                created_at: Utc::now(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                constants,
                resources: vec![input],
                results: Some(output),
                errors: Vec::new(),
            },
            pending_waits: 0,
            failure: None,
        });
        id
    }

    pub fn remote_task(&self, id: &RemoteTaskId) -> Option<RemoteTask> {
        self.lock()
            .tasks
            .iter()
            .find(|t| &t.task.id == id)
            .map(|t| t.task.clone())
    }

    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Bucket names in creation order.
    pub fn bucket_names(&self) -> Vec<String> {
        self.lock().buckets.iter().map(|b| b.name.clone()).collect()
    }

    /// Files uploaded into the bucket named `name`.
    pub fn bucket_files(&self, name: &str) -> Vec<String> {
        self.lock()
            .buckets
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.files.clone())
            .unwrap_or_default()
    }

    pub fn wait_calls(&self) -> usize {
        self.lock().wait_calls
    }

    pub fn abort_calls(&self) -> usize {
        self.lock().abort_calls
    }
}

impl Default for InMemoryCompute {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for InMemoryCompute {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn ComputeConnection>, RemoteError> {
        if !credential.is_well_formed() {
            return Err(RemoteError::Unauthorized("invalid token".into()));
        }
        debug!("connected to in-memory compute service");
        Ok(self.connection())
    }
}

struct InMemoryConnection {
    service: InMemoryCompute,
}

#[async_trait]
impl ComputeConnection for InMemoryConnection {
    async fn bucket_names(&self) -> Result<Vec<String>, RemoteError> {
        Ok(self.service.bucket_names())
    }

    async fn create_bucket(&self, name: &str) -> Result<BucketId, RemoteError> {
        let mut state = self.service.lock();
        if state.buckets.iter().any(|b| b.name == name) {
            return Err(RemoteError::Storage(format!("bucket {name} already exists")));
        }
        let id = self.service.ids.generate_bucket_id();
        state.buckets.push(StoredBucket {
            id: id.clone(),
            name: name.to_string(),
            files: Vec::new(),
        });
        Ok(id)
    }

    async fn upload_directory(&self, bucket: &BucketId, dir: &Path) -> Result<(), RemoteError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| RemoteError::Storage(format!("{}: {e}", dir.display())))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RemoteError::Storage(e.to_string()))?
        {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
        files.sort();

        let mut state = self.service.lock();
        state.bucket_mut(bucket)?.files = files;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &BucketId) -> Result<(), RemoteError> {
        let mut state = self.service.lock();
        let before = state.buckets.len();
        state.buckets.retain(|b| &b.id != bucket);
        if state.buckets.len() == before {
            return Err(RemoteError::Storage(format!("unknown bucket {bucket}")));
        }
        Ok(())
    }

    async fn submit(&self, draft: TaskDraft) -> Result<RemoteTask, RemoteError> {
        let mut state = self.service.lock();
        if let Some(err) = state.submit_error.clone() {
            return Err(err);
        }
        for bucket in draft.resources.iter().chain(draft.results.iter()) {
            state.bucket_mut(bucket)?;
        }
        let task = RemoteTask {
            id: self.service.ids.generate_task_id(),
            name: draft.name,
            state: RemoteTaskState::Submitted,
            created_at: Utc::now(),
            tags: draft.tags,
            constants: draft.constants,
            resources: draft.resources,
            results: draft.results,
            errors: Vec::new(),
        };
        let sim = SimTask {
            task: task.clone(),
            pending_waits: state.waits_until_done,
            failure: state.failure.clone(),
        };
        state.tasks.push(sim);
        debug!(task_id = %task.id, profile = %draft.profile, "task submitted");
        Ok(task)
    }

    async fn tasks_with_tag(&self, tag: &str) -> Result<Vec<RemoteTask>, RemoteError> {
        let state = self.service.lock();
        if let Some(err) = state.list_error.clone() {
            return Err(err);
        }
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.task.tags.iter().any(|t| t == tag))
            .map(|t| t.task.clone())
            .collect())
    }

    async fn task(&self, id: &RemoteTaskId) -> Result<RemoteTask, RemoteError> {
        let mut state = self.service.lock();
        Ok(state.task_mut(id)?.task.clone())
    }

    async fn wait(&self, id: &RemoteTaskId, _timeout: Duration) -> Result<bool, RemoteError> {
        let mut state = self.service.lock();
        state.wait_calls += 1;
        let sim = state.task_mut(id)?;
        if sim.task.state.is_final() {
            return Ok(true);
        }
        if sim.pending_waits > 0 {
            sim.pending_waits -= 1;
            sim.task.state = RemoteTaskState::Executing;
            return Ok(false);
        }
        match sim.failure.clone() {
            Some(message) => {
                sim.task.state = RemoteTaskState::Failure;
                sim.task.errors.push(message);
            }
            None => sim.task.state = RemoteTaskState::Success,
        }
        Ok(true)
    }

    async fn download_results(
        &self,
        id: &RemoteTaskId,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, RemoteError> {
        let name = {
            let mut state = self.service.lock();
            if let Some(err) = state.download_error.clone() {
                return Err(err);
            }
            let task = &state.task_mut(id)?.task;
            if task.results.is_none() {
                return Err(RemoteError::Storage(format!("task {id} has no result bucket")));
            }
            task.name.clone()
        };

        let storage = |e: std::io::Error| RemoteError::Storage(e.to_string());
        tokio::fs::create_dir_all(dir).await.map_err(storage)?;
        let path = dir.join(RESULT_FILE);
        tokio::fs::write(&path, format!("results of {name}\n"))
            .await
            .map_err(storage)?;
        Ok(vec![path])
    }

    async fn abort(&self, id: &RemoteTaskId) -> Result<(), RemoteError> {
        let mut state = self.service.lock();
        state.abort_calls += 1;
        if let Some(err) = state.abort_error.clone() {
            return Err(err);
        }
        let sim = state.task_mut(id)?;
        if sim.task.state.is_final() {
            return Err(RemoteError::NotRunning(id.clone()));
        }
        sim.task.state = RemoteTaskState::Cancelled;
        Ok(())
    }

    async fn delete_task(
        &self,
        id: &RemoteTaskId,
        purge_resources: bool,
        purge_results: bool,
    ) -> Result<(), RemoteError> {
        let mut state = self.service.lock();
        let index = state
            .tasks
            .iter()
            .position(|t| &t.task.id == id)
            .ok_or_else(|| RemoteError::UnknownTask(id.clone()))?;
        let task = state.tasks.remove(index).task;

        let mut purged: Vec<BucketId> = Vec::new();
        if purge_resources {
            purged.extend(task.resources);
        }
        if purge_results {
            purged.extend(task.results);
        }
        state.buckets.retain(|b| !purged.contains(&b.id));
        Ok(())
    }

    async fn output(&self, id: &RemoteTaskId) -> Result<TaskOutput, RemoteError> {
        let mut state = self.service.lock();
        let task = &state.task_mut(id)?.task;
        Ok(TaskOutput {
            stdout: format!("Running {}\\nstate: {:?}", task.name, task.state),
            stderr: task.errors.join("\\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[tokio::test]
    async fn malformed_token_is_unauthorized() {
        let compute = InMemoryCompute::new();
        let err = compute.connect(&Credential::new("nope")).await.err().unwrap();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
        assert!(compute.connect(&Credential::new(TOKEN)).await.is_ok());
    }

    #[tokio::test]
    async fn upload_records_the_directory_content() {
        let compute = InMemoryCompute::new();
        let conn = compute.connection();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.inp"), "").unwrap();

        let bucket = conn.create_bucket("in").await.unwrap();
        conn.upload_directory(&bucket, dir.path()).await.unwrap();

        assert_eq!(compute.bucket_files("in"), vec!["a.inp".to_string()]);
        assert!(conn.create_bucket("in").await.is_err());
    }

    #[tokio::test]
    async fn abort_after_conclusion_is_not_running() {
        let compute = InMemoryCompute::new();
        let conn = compute.connection();
        let id = compute.seed_task("old", &["FreeCAD macro"], Constants::new());

        assert!(conn.wait(&id, Duration::from_millis(1)).await.unwrap());
        let err = conn.abort(&id).await.unwrap_err();
        assert!(err.is_not_running());
    }

    #[tokio::test]
    async fn delete_purges_buckets() {
        let compute = InMemoryCompute::new();
        let conn = compute.connection();
        let id = compute.seed_task("old", &[], Constants::new());
        assert_eq!(compute.bucket_names().len(), 2);

        conn.delete_task(&id, true, true).await.unwrap();
        assert_eq!(compute.task_count(), 0);
        assert!(compute.bucket_names().is_empty());
    }

    #[tokio::test]
    async fn listing_filters_by_tag() {
        let compute = InMemoryCompute::new();
        let conn = compute.connection();
        compute.seed_task("mine", &["FreeCAD macro"], Constants::new());
        compute.seed_task("other", &["other tool"], Constants::new());

        let tasks = conn.tasks_with_tag("FreeCAD macro").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "mine");
    }

    #[tokio::test]
    async fn output_keeps_escaped_newlines() {
        let compute = InMemoryCompute::new();
        let conn = compute.connection();
        let id = compute.seed_task("old", &[], Constants::new());
        let out = conn.output(&id).await.unwrap();
        assert!(out.stdout.contains("\\n"));
        assert!(out.normalized().stdout.contains('\n'));
    }
}
