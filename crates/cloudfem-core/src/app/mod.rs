//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装する。
//!
//! # 主要コンポーネント
//! - **Controller**: タスクのライフサイクルを仲介
//! - **ControllerBuilder**: 構築とワイヤリング（起動時検証）
//! - **PollScheduler**: 計算中だけ動く定期ポーリング
//! - **SchedulingDelegate**: イベントでポーリングを再開・予約

pub mod builder;
pub mod controller;
pub mod scheduler;

pub use self::builder::{BuildError, ControllerBuilder};
pub use self::controller::{Controller, ControllerConfig};
pub use self::scheduler::{PollScheduler, SchedulingDelegate};
