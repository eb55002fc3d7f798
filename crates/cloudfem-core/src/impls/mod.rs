//! Impls - 実装（開発用・テスト用）
//!
//! ports の in-memory 実装。CLI のデモとテストで使う。
//! ベンダー SDK やホストアプリケーションへの本番用アダプタは別クレートに置く。
//!
//! - **InMemoryCompute**: リモート計算サービス
//! - **InMemoryHost**: ホストのドキュメントとコンソール
//! - **ScriptedSolvers**: 入力書き出し・結果取り込み
//! - **RecordingDelegate**: イベント記録

pub mod inmem_compute;
pub mod inmem_host;
pub mod recording_delegate;
pub mod scripted_solvers;

pub use self::inmem_compute::InMemoryCompute;
pub use self::inmem_host::InMemoryHost;
pub use self::recording_delegate::RecordingDelegate;
pub use self::scripted_solvers::ScriptedSolvers;
