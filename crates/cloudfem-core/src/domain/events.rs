//! Events - Controller が通知するイベント
//!
//! `EventDelegate` のメソッド呼び出しを値として表現したもの。
//! 記録用 delegate やチャネル経由の通知で使う。

use serde::{Deserialize, Serialize};

use super::ids::RemoteTaskId;

/// DomainEvent は Controller のライフサイクル通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    ConnectionEstablished,
    ConnectionFailed(String),
    TaskSubmitted(RemoteTaskId),
    TaskRetrieved(RemoteTaskId),
    TaskLoaded(RemoteTaskId),
    TaskDeleted(RemoteTaskId),
    TaskFinished(RemoteTaskId),
    TaskFailed(RemoteTaskId),
}

impl DomainEvent {
    /// The task the event is about, if any.
    pub fn task_id(&self) -> Option<&RemoteTaskId> {
        match self {
            DomainEvent::ConnectionEstablished | DomainEvent::ConnectionFailed(_) => None,
            DomainEvent::TaskSubmitted(id)
            | DomainEvent::TaskRetrieved(id)
            | DomainEvent::TaskLoaded(id)
            | DomainEvent::TaskDeleted(id)
            | DomainEvent::TaskFinished(id)
            | DomainEvent::TaskFailed(id) => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_is_tagged() {
        let e = DomainEvent::TaskFinished(RemoteTaskId::new("t1"));
        let v: serde_json::Value = serde_json::to_value(&e).unwrap();
        assert_eq!(v["event"], "task_finished");
        assert_eq!(v["data"], "t1");
        assert_eq!(e.task_id().map(|id| id.as_str()), Some("t1"));
    }

    #[test]
    fn connection_events_have_no_task() {
        assert!(DomainEvent::ConnectionEstablished.task_id().is_none());
    }
}
