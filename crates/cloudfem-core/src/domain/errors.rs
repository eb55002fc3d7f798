//! Errors - エラー型と分類
//!
//! - 利用エラー（前提条件違反）: `TaskError::Unfinished`, `ControllerError::NotConnected` など。
//!   呼び出し側のバグなので即座に `Err` を返す。
//! - リモートエラー: `RemoteError`。呼び出し境界で捕捉し、イベント・コンソールに報告する。
//! - 削除時の部分失敗: `RemoteError::NotRunning` は想定内として握りつぶす。

use thiserror::Error;

use super::ids::RemoteTaskId;
use super::solver::SolverKind;
use super::state::TaskStatus;

/// Errors raised by the compute service, named after its own taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error(
        "You have reached the maximum number of tasks you can simultaneously have on the \
         compute service. Clean up old, not-deleted tasks or consider upgrading your account"
    )]
    MaxTaskCount,

    #[error("You don't have enough credits to perform this task. Please recharge your account")]
    NotEnoughCredits,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Abort on a task that already concluded.
    #[error("task {0} is not running")]
    NotRunning(RemoteTaskId),

    #[error("unknown remote task {0}")]
    UnknownTask(RemoteTaskId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// The expected error when aborting a task that is no longer running.
    pub fn is_not_running(&self) -> bool {
        matches!(self, RemoteError::NotRunning(_))
    }
}

/// Errors from the host's solver modules (writing inputs, importing results).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("solver prerequisites not met: {0}")]
    Prerequisites(String),

    #[error("unable to set up working directory {path}: {message}")]
    WorkingDir { path: String, message: String },

    #[error("unable to write solver input: {0}")]
    Write(String),

    #[error("unable to import results: {0}")]
    Import(String),

    #[error("{0} did not produce an input file")]
    MissingInputFile(SolverKind),
}

/// Errors from the host document model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("document {0} is not open")]
    UnknownDocument(String),

    #[error("object {object} not found in document {document}")]
    UnknownObject { document: String, object: String },
}

/// Errors from a single Task Record.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("solver type not supported: {0}")]
    UnsupportedSolver(String),

    #[error("attempted to load task {name} while it is {status}")]
    Unfinished { name: String, status: TaskStatus },

    #[error("task {0} has not been submitted")]
    NotSubmitted(String),

    #[error("task metadata lacks {0}")]
    MissingMetadata(&'static str),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Errors from Controller operations.
///
/// Remote failures inside `start`, `delete_task`, `poll` and
/// `establish_connection` are reported, not returned; what comes back here
/// is mostly misuse.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("connection with the compute service has not been established yet")]
    NotConnected,

    #[error("unknown task {0}")]
    UnknownTask(RemoteTaskId),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
