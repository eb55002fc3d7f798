//! EventDelegate port - Controller のイベント通知先
//!
//! すべて fire-and-forget。戻り値が Controller の動作に影響することはない。
//! デフォルト実装は何もしないので、必要なメソッドだけ実装すればよい。
//!
//! # 実装
//! - `NoopDelegate`: 何もしない
//! - `impls::RecordingDelegate`: イベントを記録（テスト用）

use crate::domain::errors::RemoteError;
use crate::domain::ids::RemoteTaskId;

pub trait EventDelegate: Send + Sync {
    fn on_connection_established(&self) {}

    fn on_connection_failed(&self, _err: &RemoteError) {}

    fn on_task_submitted(&self, _id: &RemoteTaskId) {}

    fn on_task_retrieved(&self, _id: &RemoteTaskId) {}

    fn on_task_loaded(&self, _id: &RemoteTaskId) {}

    fn on_task_deleted(&self, _id: &RemoteTaskId) {}

    fn on_task_finished(&self, _id: &RemoteTaskId) {}

    fn on_task_failed(&self, _id: &RemoteTaskId) {}
}

/// Delegate that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl EventDelegate for NoopDelegate {}
