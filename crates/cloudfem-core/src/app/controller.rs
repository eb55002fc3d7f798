//! Controller - タスク群のオーケストレーション
//!
//! 接続ハンドル・アクティブなタスク・復元候補（old task）を所有し、
//! すべての状態遷移を仲介する。
//!
//! # エラー方針
//! - 利用エラー（未接続、未知の ID、未完了タスクのロード）は `Err` で返す
//! - リモートサービスのエラーは呼び出し境界で捕捉し、イベント・ホストの
//!   コンソール・tracing に報告する
//!
//! # 並行性
//! すべて `&mut self`。ホストは `Arc<tokio::sync::Mutex<Controller>>` で共有し、
//! ポーリングは `PollScheduler` から駆動する。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::credential::Credential;
use crate::domain::errors::ControllerError;
use crate::domain::ids::RemoteTaskId;
use crate::domain::metadata::TOOL_TAG;
use crate::domain::old_task::OldTaskRecord;
use crate::domain::solver::SolverRef;
use crate::domain::state::TaskStatus;
use crate::domain::task::{SubmitSettings, TaskRecord};
use crate::observability::{TaskCounts, TaskSummary};
use crate::ports::{
    Clock, ComputeConnection, ConsoleLevel, Connector, EventDelegate, HostEnvironment,
    SolverIntegration, TaskOutput,
};

/// Behaviour knobs of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Tag marking the tasks submitted by this tool.
    pub tag: String,
    pub profile: String,
    pub instance_count: u32,

    /// Upper bound of one remote wait during a poll.
    pub wait_timeout: Duration,

    /// Delete a task once its results are loaded.
    pub discard_after_load: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tag: TOOL_TAG.to_string(),
            profile: "docker-batch".to_string(),
            instance_count: 1,
            wait_timeout: Duration::from_millis(1),
            discard_after_load: true,
        }
    }
}

impl ControllerConfig {
    pub fn submit_settings(&self) -> SubmitSettings {
        SubmitSettings {
            tag: self.tag.clone(),
            profile: self.profile.clone(),
            instance_count: self.instance_count,
        }
    }
}

pub struct Controller {
    connector: Arc<dyn Connector>,
    host: Arc<dyn HostEnvironment>,
    solvers: Arc<dyn SolverIntegration>,
    events: Arc<dyn EventDelegate>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,

    connection: Option<Arc<dyn ComputeConnection>>,
    tasks: HashMap<RemoteTaskId, TaskRecord>,
    old_tasks: HashMap<RemoteTaskId, OldTaskRecord>,
}

impl Controller {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        host: Arc<dyn HostEnvironment>,
        solvers: Arc<dyn SolverIntegration>,
        events: Arc<dyn EventDelegate>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            connector,
            host,
            solvers,
            events,
            clock,
            config,
            connection: None,
            tasks: HashMap::new(),
            old_tasks: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self) -> Result<Arc<dyn ComputeConnection>, ControllerError> {
        self.connection.clone().ok_or(ControllerError::NotConnected)
    }

    fn report(&self, level: ConsoleLevel, message: &str) {
        self.host.report(level, message);
    }

    // ========================================
    // Connection
    // ========================================

    /// Connect with `credential`, replacing any previous connection.
    ///
    /// On success the remote tasks of earlier sessions are scanned.
    /// Failures are reported through the event delegate, never returned.
    pub async fn establish_connection(&mut self, credential: &Credential) -> bool {
        self.connection = None;
        match self.connector.connect(credential).await {
            Ok(conn) => {
                self.connection = Some(conn);
                info!("connection established");
                self.events.on_connection_established();
                if let Err(err) = self.refresh_old_tasks().await {
                    warn!(error = %err, "scan of previous tasks failed");
                    self.report(
                        ConsoleLevel::Warning,
                        &format!("Unable to list previous tasks: {err}"),
                    );
                }
                true
            }
            Err(err) => {
                warn!(error = %err, "connection failed");
                self.events.on_connection_failed(&err);
                false
            }
        }
    }

    /// Rebuild the old-task map from the remote tasks carrying the tool tag.
    ///
    /// Tasks tracked locally and incomplete ones are left out.
    pub async fn refresh_old_tasks(&mut self) -> Result<usize, ControllerError> {
        let conn = self.connection()?;
        let remote = conn.tasks_with_tag(&self.config.tag).await?;

        self.old_tasks.clear();
        for task in remote {
            if self.tasks.contains_key(&task.id) {
                continue;
            }
            let old = OldTaskRecord::new(task);
            if old.is_complete() {
                self.old_tasks.insert(old.id().clone(), old);
            } else {
                debug!(task_id = %old.id(), missing = ?old.missing_keys(), "incomplete task skipped");
            }
        }
        info!(count = self.old_tasks.len(), "previous tasks found");
        Ok(self.old_tasks.len())
    }

    // ========================================
    // Submission
    // ========================================

    /// Submit a computation for `solver`.
    ///
    /// A blank `name` becomes `<solver label>_<HH.MM.SS>`. Returns the remote
    /// id, or `None` when the task could not be set up or submitted (the
    /// failure is reported on the host console).
    pub async fn start(
        &mut self,
        solver: &SolverRef,
        name: Option<&str>,
        working_dir: Option<&Path>,
    ) -> Result<Option<RemoteTaskId>, ControllerError> {
        let conn = self.connection()?;
        let name = match name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.default_name(solver),
        };

        let mut record = match TaskRecord::new(
            solver.clone(),
            name.clone(),
            working_dir,
            self.host.clone(),
            self.solvers.clone(),
        ) {
            Ok(record) => record,
            Err(err) => {
                warn!(name = %name, error = %err, "task setup failed");
                self.report(ConsoleLevel::Error, &format!("Unable to set up task {name}: {err}"));
                return Ok(None);
            }
        };

        match record
            .run(conn.as_ref(), &self.config.submit_settings())
            .await
        {
            Ok(id) => {
                debug_assert_eq!(record.status(), TaskStatus::Computing);
                self.tasks.insert(id.clone(), record);
                self.events.on_task_submitted(&id);
                Ok(Some(id))
            }
            Err(err) => {
                warn!(name = %name, error = %err, "submission failed");
                self.report(ConsoleLevel::Error, &format!("Unable to submit task {name}: {err}"));
                Ok(None)
            }
        }
    }

    fn default_name(&self, solver: &SolverRef) -> String {
        format!("{}_{}", solver.label, self.clock.now().format("%H.%M.%S"))
    }

    // ========================================
    // Results
    // ========================================

    /// Import the results of a concluded task.
    pub async fn load_result(&mut self, id: &RemoteTaskId) -> Result<(), ControllerError> {
        let record = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| ControllerError::UnknownTask(id.clone()))?;
        record.load_result()?;
        self.events.on_task_loaded(id);

        if self.config.discard_after_load {
            self.delete_task(id).await;
        }
        Ok(())
    }

    /// Load every `Finished` task. Returns how many were loaded.
    pub async fn load_all(&mut self) -> Result<usize, ControllerError> {
        let ids = self.ids_with_status(&[TaskStatus::Finished]);
        for id in &ids {
            self.load_result(id).await?;
        }
        Ok(ids.len())
    }

    /// Abort and delete a task, active or old.
    ///
    /// The record leaves its map whatever the remote outcome. Unknown ids
    /// are ignored.
    pub async fn delete_task(&mut self, id: &RemoteTaskId) {
        let conn = self.connection.clone();
        if let Some(mut record) = self.tasks.remove(id) {
            record.discard(conn.as_deref()).await;
        } else if let Some(old) = self.old_tasks.remove(id) {
            if let Some(conn) = conn.as_deref() {
                old.discard(conn, self.host.as_ref()).await;
            }
        } else {
            debug!(task_id = %id, "delete of unknown task ignored");
            return;
        }

        if conn.is_none() {
            self.report(
                ConsoleLevel::Warning,
                &format!("Not connected: remote task {id} was left on the compute service"),
            );
        }
        info!(task_id = %id, "task deleted");
        self.events.on_task_deleted(id);
    }

    // ========================================
    // Polling
    // ========================================

    /// Check every computing task once.
    ///
    /// Errors are reported per task and do not stop the sweep.
    pub async fn poll(&mut self) {
        let Some(conn) = self.connection.clone() else {
            return;
        };
        let timeout = self.config.wait_timeout;
        for (id, record) in self.tasks.iter_mut() {
            if record.status() != TaskStatus::Computing {
                continue;
            }
            match record.wait_callback(conn.as_ref(), timeout).await {
                Ok(_) => emit_conclusion(self.events.as_ref(), id, record.status()),
                Err(err) => {
                    warn!(task_id = %id, error = %err, "poll failed");
                    self.host.report(
                        ConsoleLevel::Warning,
                        &format!("Unable to check task {}: {err}", record.name()),
                    );
                }
            }
        }
    }

    pub fn is_computing(&self) -> bool {
        self.tasks
            .values()
            .any(|t| t.status() == TaskStatus::Computing)
    }

    // ========================================
    // Recovery
    // ========================================

    /// Solver of an old task, when its document is open and the solver still exists.
    fn old_task_solver(&self, old: &OldTaskRecord) -> Option<SolverRef> {
        if !old.is_complete() {
            return None;
        }
        self.host.solver(old.document_path()?, old.solver_name()?)
    }

    pub fn is_retrievable(&self, id: &RemoteTaskId) -> bool {
        self.old_tasks
            .get(id)
            .and_then(|old| self.old_task_solver(old))
            .is_some()
    }

    /// Promote an old task into the active tasks and poll it once.
    ///
    /// Returns `false` when the task is not retrievable right now.
    pub async fn retrieve_task(&mut self, id: &RemoteTaskId) -> Result<bool, ControllerError> {
        let old = self
            .old_tasks
            .get(id)
            .ok_or_else(|| ControllerError::UnknownTask(id.clone()))?;
        let Some(solver) = self.old_task_solver(old) else {
            debug!(task_id = %id, "task not retrievable");
            return Ok(false);
        };

        let record = TaskRecord::recover(old, solver, self.host.clone(), self.solvers.clone())?;
        self.old_tasks.remove(id);
        let record = self.tasks.entry(id.clone()).insert_entry(record).into_mut();
        info!(task_id = %id, name = %record.name(), "task retrieved");

        let mut concluded = None;
        if let Some(conn) = self.connection.clone() {
            match record
                .wait_callback(conn.as_ref(), self.config.wait_timeout)
                .await
            {
                Ok(_) => concluded = Some(record.status()),
                Err(err) => {
                    warn!(task_id = %id, error = %err, "poll of retrieved task failed");
                }
            }
        }

        self.events.on_task_retrieved(id);
        if let Some(status) = concluded {
            emit_conclusion(self.events.as_ref(), id, status);
        }
        Ok(true)
    }

    /// Promote every retrievable old task. Returns how many were promoted.
    pub async fn retrieve_all(&mut self) -> usize {
        let ids: Vec<RemoteTaskId> = self
            .old_tasks
            .keys()
            .filter(|id| self.is_retrievable(id))
            .cloned()
            .collect();

        let mut retrieved = 0;
        for id in ids {
            match self.retrieve_task(&id).await {
                Ok(true) => retrieved += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(task_id = %id, error = %err, "retrieve failed");
                    self.report(
                        ConsoleLevel::Error,
                        &format!("Unable to retrieve task {id}: {err}"),
                    );
                }
            }
        }
        retrieved
    }

    // ========================================
    // Inspection
    // ========================================

    /// Active tasks, optionally restricted to some statuses.
    pub fn list_tasks(&self, statuses: Option<&[TaskStatus]>) -> Vec<&TaskRecord> {
        self.tasks
            .values()
            .filter(|t| statuses.is_none_or(|s| s.contains(&t.status())))
            .collect()
    }

    fn ids_with_status(&self, statuses: &[TaskStatus]) -> Vec<RemoteTaskId> {
        self.tasks
            .iter()
            .filter(|(_, t)| statuses.contains(&t.status()))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn task(&self, id: &RemoteTaskId) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    pub fn old_tasks(&self) -> Vec<&OldTaskRecord> {
        self.old_tasks.values().collect()
    }

    pub fn old_task(&self, id: &RemoteTaskId) -> Option<&OldTaskRecord> {
        self.old_tasks.get(id)
    }

    pub fn is_old_task(&self, id: &RemoteTaskId) -> bool {
        self.old_tasks.contains_key(id)
    }

    /// Rows for a task panel, oldest first.
    pub fn panel(&self) -> Vec<TaskSummary> {
        let active = self.tasks.iter().map(|(id, t)| TaskSummary {
            id: id.clone(),
            name: t.name().to_string(),
            created_at: t.created_at(),
            status: Some(t.status()),
            document: Some(t.document().path.display().to_string()),
            is_old: false,
        });
        let old = self.old_tasks.values().map(|t| TaskSummary {
            id: t.id().clone(),
            name: t.name().to_string(),
            created_at: Some(t.created_at()),
            status: None,
            document: t.document_path().map(|p| p.display().to_string()),
            is_old: true,
        });

        let mut rows: Vec<TaskSummary> = active.chain(old).collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        rows
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts {
            old: self.old_tasks.len(),
            ..TaskCounts::default()
        };
        for task in self.tasks.values() {
            counts.add(task.status());
        }
        counts
    }

    /// Remote stdout and stderr of a task, active or old.
    pub async fn task_output(&self, id: &RemoteTaskId) -> Result<TaskOutput, ControllerError> {
        if !self.tasks.contains_key(id) && !self.old_tasks.contains_key(id) {
            return Err(ControllerError::UnknownTask(id.clone()));
        }
        let conn = self.connection()?;
        let output = conn.output(id).await?;
        Ok(output.normalized())
    }
}

fn emit_conclusion(events: &dyn EventDelegate, id: &RemoteTaskId, status: TaskStatus) {
    match status {
        TaskStatus::Finished => events.on_task_finished(id),
        TaskStatus::Error => events.on_task_failed(id),
        _ => {}
    }
}
