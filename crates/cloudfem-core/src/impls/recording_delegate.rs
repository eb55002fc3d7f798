//! RecordingDelegate - イベントを記録する EventDelegate（テスト・デモ用）

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::errors::RemoteError;
use crate::domain::events::DomainEvent;
use crate::domain::ids::RemoteTaskId;
use crate::ports::event_delegate::EventDelegate;

#[derive(Debug, Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DomainEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: DomainEvent) {
        self.lock().push(event);
    }

    /// Events received so far, oldest first.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.lock())
    }
}

impl EventDelegate for RecordingDelegate {
    fn on_connection_established(&self) {
        self.push(DomainEvent::ConnectionEstablished);
    }

    fn on_connection_failed(&self, err: &RemoteError) {
        self.push(DomainEvent::ConnectionFailed(err.to_string()));
    }

    fn on_task_submitted(&self, id: &RemoteTaskId) {
        self.push(DomainEvent::TaskSubmitted(id.clone()));
    }

    fn on_task_retrieved(&self, id: &RemoteTaskId) {
        self.push(DomainEvent::TaskRetrieved(id.clone()));
    }

    fn on_task_loaded(&self, id: &RemoteTaskId) {
        self.push(DomainEvent::TaskLoaded(id.clone()));
    }

    fn on_task_deleted(&self, id: &RemoteTaskId) {
        self.push(DomainEvent::TaskDeleted(id.clone()));
    }

    fn on_task_finished(&self, id: &RemoteTaskId) {
        self.push(DomainEvent::TaskFinished(id.clone()));
    }

    fn on_task_failed(&self, id: &RemoteTaskId) {
        self.push(DomainEvent::TaskFailed(id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_drains_events() {
        let delegate = RecordingDelegate::new();
        delegate.on_connection_established();
        delegate.on_task_finished(&RemoteTaskId::new("t1"));

        assert_eq!(
            delegate.take(),
            vec![
                DomainEvent::ConnectionEstablished,
                DomainEvent::TaskFinished(RemoteTaskId::new("t1")),
            ]
        );
        assert!(delegate.events().is_empty());
    }
}
