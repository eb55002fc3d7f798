//! cloudfem-core
//!
//! FEM ソルバーの計算をリモート計算サービスへ送り、結果をホストの
//! ドキュメントへ取り込むプラグインのコア。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, solver, metadata, task, old_task, errors, events）
//! - **ports**: 抽象化レイヤー（ComputeConnection, HostEnvironment, SolverIntegration, EventDelegate, Clock）
//! - **app**: アプリケーションロジック（Controller, ControllerBuilder, PollScheduler）
//! - **impls**: 実装（InMemoryCompute など開発用）
//! - **config**: 設定ファイルと認証トークンの永続化
//! - observability: タスクパネル向けのビュー

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
