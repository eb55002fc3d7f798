//! Compute port - リモート計算サービス（ベンダー SDK）の抽象化
//!
//! 接続・認証・バケット転送・タスク搬送はサービス側の責務。
//! このクレートは呼び出すだけで再実装しない。
//!
//! # 実装
//! - `impls::InMemoryCompute`: 開発・テスト用

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::credential::Credential;
use crate::domain::errors::RemoteError;
use crate::domain::ids::{BucketId, RemoteTaskId};
use crate::domain::metadata::Constants;

/// Remote lifecycle of a task as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteTaskState {
    Submitted,
    Dispatched,
    Executing,
    Success,
    Failure,
    Cancelled,
}

impl RemoteTaskState {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            RemoteTaskState::Success | RemoteTaskState::Failure | RemoteTaskState::Cancelled
        )
    }
}

/// Everything needed to submit a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub name: String,

    /// Execution profile on the service (e.g. `docker-batch`).
    pub profile: String,

    /// Number of compute units.
    pub instance_count: u32,

    pub tags: Vec<String>,
    pub constants: Constants,

    /// Buckets mounted as input resources.
    pub resources: Vec<BucketId>,

    /// Bucket receiving the results.
    pub results: Option<BucketId>,
}

/// Snapshot of a task held by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: RemoteTaskId,
    pub name: String,
    pub state: RemoteTaskState,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub constants: Constants,
    pub resources: Vec<BucketId>,
    pub results: Option<BucketId>,

    /// Error messages reported by the service, most relevant first.
    pub errors: Vec<String>,
}

/// Captured output of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub stdout: String,
    pub stderr: String,
}

impl TaskOutput {
    /// The service returns escaped `\n` sequences instead of newlines.
    pub fn normalized(self) -> Self {
        Self {
            stdout: self.stdout.replace("\\n", "\n"),
            stderr: self.stderr.replace("\\n", "\n"),
        }
    }
}

/// An established connection to the compute service.
#[async_trait]
pub trait ComputeConnection: Send + Sync {
    /// Names of the buckets that already exist.
    async fn bucket_names(&self) -> Result<Vec<String>, RemoteError>;

    async fn create_bucket(&self, name: &str) -> Result<BucketId, RemoteError>;

    /// Upload the content of a local directory into a bucket.
    async fn upload_directory(&self, bucket: &BucketId, dir: &Path) -> Result<(), RemoteError>;

    async fn delete_bucket(&self, bucket: &BucketId) -> Result<(), RemoteError>;

    /// Submit a task; the service assigns its id.
    async fn submit(&self, draft: TaskDraft) -> Result<RemoteTask, RemoteError>;

    /// All tasks carrying `tag`.
    async fn tasks_with_tag(&self, tag: &str) -> Result<Vec<RemoteTask>, RemoteError>;

    async fn task(&self, id: &RemoteTaskId) -> Result<RemoteTask, RemoteError>;

    /// Wait at most `timeout` for the task to conclude. Returns whether it did.
    async fn wait(&self, id: &RemoteTaskId, timeout: Duration) -> Result<bool, RemoteError>;

    /// Download the result bucket into `dir`; returns the written files.
    async fn download_results(
        &self,
        id: &RemoteTaskId,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, RemoteError>;

    /// Fails with `RemoteError::NotRunning` when the task already concluded.
    async fn abort(&self, id: &RemoteTaskId) -> Result<(), RemoteError>;

    async fn delete_task(
        &self,
        id: &RemoteTaskId,
        purge_resources: bool,
        purge_results: bool,
    ) -> Result<(), RemoteError>;

    async fn output(&self, id: &RemoteTaskId) -> Result<TaskOutput, RemoteError>;
}

/// Opens connections from a credential.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn ComputeConnection>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_newlines_are_unescaped() {
        let out = TaskOutput {
            stdout: "step 1\\nstep 2".into(),
            stderr: String::new(),
        }
        .normalized();
        assert_eq!(out.stdout, "step 1\nstep 2");
    }

    #[test]
    fn final_states() {
        assert!(RemoteTaskState::Failure.is_final());
        assert!(RemoteTaskState::Cancelled.is_final());
        assert!(!RemoteTaskState::Executing.is_final());
    }
}
