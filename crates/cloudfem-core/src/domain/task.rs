//! TaskRecord - 1 回のリモート計算
//!
//! ソルバー参照・作業ディレクトリ・リモートハンドルを束ね、
//! `SettingUp -> Writing -> Computing -> {Finished | Error} -> Loaded`
//! のライフサイクルを進める。
//!
//! # 不変条件
//! - status は遷移グラフに沿って前にしか進まない（例外は `resume_computing`）
//! - `remote_id` が `None` ⇔ まだ送信されていない

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::errors::{SolverError, TaskError};
use super::ids::{BucketId, RemoteTaskId};
use super::metadata::{
    CCX_TOOLS_INPUT_KEY, Constants, DOCKER_CMD_KEY, DOCKER_REPO_KEY, DOCUMENT_KEY, SOLVER_KEY,
    WORKING_DIR_KEY,
};
use super::naming::rectify_bucket_name;
use super::old_task::OldTaskRecord;
use super::solver::{DocumentRef, ExecutionProfile, SolverKind, SolverRef, input_stem};
use super::state::TaskStatus;
use crate::ports::compute::{ComputeConnection, RemoteTask, RemoteTaskState, TaskDraft};
use crate::ports::host::{ConsoleLevel, HostEnvironment};
use crate::ports::solver_integration::SolverIntegration;

/// How a task is submitted to the compute service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSettings {
    pub tag: String,
    pub profile: String,
    pub instance_count: u32,
}

pub struct TaskRecord {
    name: String,
    solver: SolverRef,
    kind: SolverKind,
    working_dir: PathBuf,
    status: TaskStatus,
    remote_id: Option<RemoteTaskId>,
    input_bucket: Option<BucketId>,
    output_bucket: Option<BucketId>,
    input_file: Option<PathBuf>,
    created_at: Option<DateTime<Utc>>,
    result_object_names: Vec<String>,
    host: Arc<dyn HostEnvironment>,
    solvers: Arc<dyn SolverIntegration>,
}

impl TaskRecord {
    /// Resolve the solver kind and prepare the working directory.
    ///
    /// `requested_dir` is the directory picked by the user, if any.
    pub fn new(
        solver: SolverRef,
        name: impl Into<String>,
        requested_dir: Option<&Path>,
        host: Arc<dyn HostEnvironment>,
        solvers: Arc<dyn SolverIntegration>,
    ) -> Result<Self, TaskError> {
        let kind = SolverKind::from_type_id(&solver.type_id)?;
        let working_dir = solvers.setup(&solver, kind, requested_dir)?;
        let name = name.into();
        debug!(name = %name, kind = %kind, dir = %working_dir.display(), "task set up");

        Ok(Self {
            name,
            solver,
            kind,
            working_dir,
            status: TaskStatus::SettingUp,
            remote_id: None,
            input_bucket: None,
            output_bucket: None,
            input_file: None,
            created_at: None,
            result_object_names: Vec::new(),
            host,
            solvers,
        })
    }

    /// Rebuild a record from a task submitted in an earlier session.
    ///
    /// The remote handles are transplanted from `old` and the record
    /// re-enters `Computing`.
    pub fn recover(
        old: &OldTaskRecord,
        solver: SolverRef,
        host: Arc<dyn HostEnvironment>,
        solvers: Arc<dyn SolverIntegration>,
    ) -> Result<Self, TaskError> {
        let working_dir = old
            .working_dir()
            .ok_or(TaskError::MissingMetadata(WORKING_DIR_KEY))?;
        let mut record = Self::new(solver, old.name(), Some(&working_dir), host, solvers)?;

        if record.kind.is_tool_based() {
            let input = old
                .ccx_input_file()
                .ok_or(TaskError::MissingMetadata(CCX_TOOLS_INPUT_KEY))?;
            record.input_file = Some(input);
        }
        record.remote_id = Some(old.id().clone());
        record.input_bucket = old.resources().first().cloned();
        record.output_bucket = old.results().cloned();
        record.created_at = Some(old.created_at());
        record.resume_computing();
        Ok(record)
    }

    /// Validate the solver and write its input files.
    pub fn prepare(&mut self) -> Result<(), TaskError> {
        self.advance(TaskStatus::Writing)?;
        let written = self
            .solvers
            .write_input(&self.solver, self.kind, &self.working_dir)?;
        if self.kind.requires_input_file() && written.input_file.is_none() {
            return Err(SolverError::MissingInputFile(self.kind).into());
        }
        self.input_file = written.input_file;
        Ok(())
    }

    /// Prepare, upload and submit.
    ///
    /// On failure the record keeps no remote handle, stays in `Writing`,
    /// and the buckets created on the way are deleted.
    pub async fn run(
        &mut self,
        conn: &dyn ComputeConnection,
        settings: &SubmitSettings,
    ) -> Result<RemoteTaskId, TaskError> {
        if self.remote_id.is_some() {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Computing,
            });
        }
        self.prepare()?;

        let stem = self.input_file.as_deref().and_then(input_stem);
        let profile = self.kind.execution(stem.as_deref())?;

        let mut created = Vec::new();
        let remote = match self.submit(conn, settings, &profile, &mut created).await {
            Ok(remote) => remote,
            Err(err) => {
                for bucket in &created {
                    if let Err(e) = conn.delete_bucket(bucket).await {
                        warn!(bucket = %bucket, error = %e, "failed to delete bucket");
                    }
                }
                return Err(err);
            }
        };

        self.advance(TaskStatus::Computing)?;
        self.input_bucket = remote.resources.first().cloned();
        self.output_bucket = remote.results.clone();
        self.created_at = Some(remote.created_at);
        self.remote_id = Some(remote.id.clone());
        info!(task_id = %remote.id, name = %self.name, "task submitted");
        Ok(remote.id)
    }

    async fn submit(
        &self,
        conn: &dyn ComputeConnection,
        settings: &SubmitSettings,
        profile: &ExecutionProfile,
        created: &mut Vec<BucketId>,
    ) -> Result<RemoteTask, TaskError> {
        let mut taken = conn.bucket_names().await?;

        let input_name = rectify_bucket_name(&taken, &format!("input-resource-{}", self.name));
        let input = conn.create_bucket(&input_name).await?;
        created.push(input.clone());
        taken.push(input_name);
        conn.upload_directory(&input, &self.working_dir).await?;

        let output_name = rectify_bucket_name(&taken, &format!("output-{}", self.name));
        let output = conn.create_bucket(&output_name).await?;
        created.push(output.clone());

        let draft = TaskDraft {
            name: self.name.clone(),
            profile: settings.profile.clone(),
            instance_count: settings.instance_count,
            tags: vec![settings.tag.clone()],
            constants: self.constants(profile),
            resources: vec![input],
            results: Some(output),
        };
        Ok(conn.submit(draft).await?)
    }

    /// Metadata stored on the remote task so a later session can recover it.
    fn constants(&self, profile: &ExecutionProfile) -> Constants {
        let mut constants = Constants::new();
        constants.insert(
            WORKING_DIR_KEY.to_string(),
            self.working_dir.display().to_string(),
        );
        constants.insert(
            DOCUMENT_KEY.to_string(),
            self.solver.document.path.display().to_string(),
        );
        constants.insert(SOLVER_KEY.to_string(), self.solver.name.clone());
        if self.kind.is_tool_based()
            && let Some(input) = &self.input_file
        {
            constants.insert(CCX_TOOLS_INPUT_KEY.to_string(), input.display().to_string());
        }
        constants.insert(DOCKER_REPO_KEY.to_string(), profile.image.clone());
        constants.insert(DOCKER_CMD_KEY.to_string(), profile.command.clone());
        constants
    }

    /// Check on the remote task, at most `timeout` long.
    ///
    /// Returns whether the remote step is over. Results are downloaded into
    /// the working directory on success; a failed download leaves the
    /// record in `Computing`.
    pub async fn wait_callback(
        &mut self,
        conn: &dyn ComputeConnection,
        timeout: Duration,
    ) -> Result<bool, TaskError> {
        if self.status.is_remote_done() {
            return Ok(true);
        }
        let id = match (&self.remote_id, self.status.is_remote_started()) {
            (Some(id), true) => id.clone(),
            _ => return Err(TaskError::NotSubmitted(self.name.clone())),
        };

        if !conn.wait(&id, timeout).await? {
            return Ok(false);
        }

        let snapshot = conn.task(&id).await?;
        match snapshot.state {
            RemoteTaskState::Success => {
                let files = conn.download_results(&id, &self.working_dir).await?;
                self.advance(TaskStatus::Finished)?;
                info!(task_id = %id, files = files.len(), "task finished");
            }
            RemoteTaskState::Failure | RemoteTaskState::Cancelled => {
                let reason = snapshot
                    .errors
                    .first()
                    .map(String::as_str)
                    .unwrap_or("no error reported");
                self.host.report(
                    ConsoleLevel::Error,
                    &format!("Task {} failed: {reason}", self.name),
                );
                self.advance(TaskStatus::Error)?;
                warn!(task_id = %id, reason, "task failed");
            }
            RemoteTaskState::Submitted
            | RemoteTaskState::Dispatched
            | RemoteTaskState::Executing => return Ok(false),
        }
        Ok(true)
    }

    /// Import the downloaded results into the solver's document.
    ///
    /// Every object the import adds is relabeled `<task name>_<label>`.
    pub fn load_result(&mut self) -> Result<(), TaskError> {
        if !self.status.is_remote_done() {
            return Err(TaskError::Unfinished {
                name: self.name.clone(),
                status: self.status,
            });
        }

        let document = &self.solver.document;
        let before: Vec<String> = self
            .host
            .objects(document)
            .into_iter()
            .map(|o| o.name)
            .collect();

        self.solvers.import_results(
            &self.solver,
            self.kind,
            &self.working_dir,
            self.input_file.as_deref(),
        )?;

        let added: Vec<_> = self
            .host
            .objects(document)
            .into_iter()
            .filter(|o| !before.contains(&o.name))
            .collect();
        for object in &added {
            let label = format!("{}_{}", self.name, object.label);
            self.host.relabel(document, &object.name, &label)?;
        }
        self.result_object_names
            .extend(added.into_iter().map(|o| o.name));

        self.advance(TaskStatus::Loaded)?;
        info!(name = %self.name, objects = self.result_object_names.len(), "results loaded");
        Ok(())
    }

    /// Abort and delete the remote task, then drop the remote handles.
    ///
    /// Remote failures are reported, never returned.
    pub async fn discard(&mut self, conn: Option<&dyn ComputeConnection>) {
        if let Some(id) = self.remote_id.take() {
            match conn {
                Some(conn) => purge_remote_task(conn, &id, self.host.as_ref()).await,
                None => warn!(task_id = %id, "no connection, remote task left in place"),
            }
        }
        self.input_bucket = None;
        self.output_bucket = None;
    }

    /// Re-enter `Computing` after recovery.
    pub fn resume_computing(&mut self) {
        self.status = TaskStatus::Computing;
    }

    fn advance(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_advance_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn solver(&self) -> &SolverRef {
        &self.solver
    }

    pub fn document(&self) -> &DocumentRef {
        &self.solver.document
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn remote_id(&self) -> Option<&RemoteTaskId> {
        self.remote_id.as_ref()
    }

    pub fn input_bucket(&self) -> Option<&BucketId> {
        self.input_bucket.as_ref()
    }

    pub fn output_bucket(&self) -> Option<&BucketId> {
        self.output_bucket.as_ref()
    }

    pub fn input_file(&self) -> Option<&Path> {
        self.input_file.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Objects added to the document by `load_result`.
    pub fn result_object_names(&self) -> &[String] {
        &self.result_object_names
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("name", &self.name)
            .field("solver", &self.solver.name)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("remote_id", &self.remote_id)
            .finish_non_exhaustive()
    }
}

/// Abort then delete a remote task with its buckets.
///
/// Aborting a task that already concluded is expected and ignored.
pub(crate) async fn purge_remote_task(
    conn: &dyn ComputeConnection,
    id: &RemoteTaskId,
    host: &dyn HostEnvironment,
) {
    match conn.abort(id).await {
        Ok(()) => debug!(task_id = %id, "task aborted"),
        Err(err) if err.is_not_running() => debug!(task_id = %id, "task was not running"),
        Err(err) => {
            warn!(task_id = %id, error = %err, "abort failed");
            host.report(ConsoleLevel::Error, &format!("Unable to abort task {id}: {err}"));
        }
    }
    if let Err(err) = conn.delete_task(id, true, true).await {
        warn!(task_id = %id, error = %err, "delete failed");
        host.report(ConsoleLevel::Error, &format!("Unable to delete task {id}: {err}"));
    }
}
