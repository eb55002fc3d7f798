use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::RemoteTaskId;
use crate::domain::state::TaskStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub setting_up: usize,
    pub writing: usize,
    pub computing: usize,
    pub finished: usize,
    pub error: usize,
    pub loaded: usize,
    pub old: usize,
}

impl TaskCounts {
    pub fn add(&mut self, status: TaskStatus) {
        let slot = match status {
            TaskStatus::SettingUp => &mut self.setting_up,
            TaskStatus::Writing => &mut self.writing,
            TaskStatus::Computing => &mut self.computing,
            TaskStatus::Finished => &mut self.finished,
            TaskStatus::Error => &mut self.error,
            TaskStatus::Loaded => &mut self.loaded,
        };
        *slot += 1;
    }
}

/// One row of the task panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: RemoteTaskId,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    /// `None` for old tasks, whose local status is unknown.
    pub status: Option<TaskStatus>,
    /// Document file the task belongs to.
    pub document: Option<String>,
    pub is_old: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_status() {
        let mut counts = TaskCounts::default();
        counts.add(TaskStatus::Computing);
        counts.add(TaskStatus::Computing);
        counts.add(TaskStatus::Loaded);
        assert_eq!(counts.computing, 2);
        assert_eq!(counts.loaded, 1);
        assert_eq!(counts.finished, 0);
    }

    #[test]
    fn summary_serializes_status_like_the_panel() {
        let summary = TaskSummary {
            id: RemoteTaskId::new("t1"),
            name: "Beam".into(),
            created_at: None,
            status: Some(TaskStatus::Finished),
            document: Some("/home/u/beam.FCStd".into()),
            is_old: false,
        };
        let v = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["status"], "FINISHED");
        assert_eq!(v["id"], "t1");
    }
}
