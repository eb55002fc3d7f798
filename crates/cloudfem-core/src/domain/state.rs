//! State - Task Record のライフサイクル
//!
//! 状態遷移:
//! - SettingUp -> Writing -> Computing -> {Finished | Error} -> Loaded
//! - リカバリ時のみ Computing への再突入を許可（`TaskRecord::recover`）

use serde::{Deserialize, Serialize};
use std::fmt;

/// TaskStatus はタスクの状態を表現
///
/// 宣言順に全順序を持つので、「リモート処理が始まったか」は
/// `status >= Computing`、「終わったか」は `status > Computing` で判定できる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Solver resolved, working directory prepared.
    SettingUp,

    /// Input files are being (or have been) written.
    Writing,

    /// Submitted to the compute service.
    Computing,

    /// Remote computation succeeded and results were downloaded.
    Finished,

    /// Remote computation failed.
    Error,

    /// Results were imported into the host document.
    Loaded,
}

impl TaskStatus {
    /// Has the remote step begun?
    pub fn is_remote_started(self) -> bool {
        self >= TaskStatus::Computing
    }

    /// Has the remote step completed (successfully or not)?
    pub fn is_remote_done(self) -> bool {
        self > TaskStatus::Computing
    }

    /// Edges of the transition graph.
    ///
    /// `Writing -> Writing` covers rewriting inputs before submission.
    /// Re-entering `Computing` from anywhere else is not an edge: recovery
    /// goes through an explicit reset.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (SettingUp, Writing)
                | (Writing, Writing)
                | (Writing, Computing)
                | (Computing, Finished)
                | (Computing, Error)
                | (Finished, Loaded)
                | (Error, Loaded)
                | (Loaded, Loaded)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::SettingUp => "SETTING_UP",
            TaskStatus::Writing => "WRITING",
            TaskStatus::Computing => "COMPUTING",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Error => "ERROR",
            TaskStatus::Loaded => "LOADED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
