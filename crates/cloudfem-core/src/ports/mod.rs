//! Ports - 抽象化レイヤー
//!
//! 外部の協調者（リモート計算サービス、ホストアプリケーション、
//! ソルバーモジュール、UI）へのインターフェースを trait として定義し、
//! Controller はこれらにだけ依存する。
//!
//! - compute: リモート計算サービス（async）
//! - host: ホストのドキュメント・コンソール
//! - solver_integration: 入力書き出し・結果取り込み
//! - event_delegate: ライフサイクル通知の購読者
//! - clock / id_generator: 時刻と ID

pub mod clock;
pub mod compute;
pub mod event_delegate;
pub mod host;
pub mod id_generator;
pub mod solver_integration;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::compute::{
    ComputeConnection, Connector, RemoteTask, RemoteTaskState, TaskDraft, TaskOutput,
};
pub use self::event_delegate::{EventDelegate, NoopDelegate};
pub use self::host::{ConsoleLevel, HostEnvironment};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::solver_integration::{SolverIntegration, WrittenInput};
