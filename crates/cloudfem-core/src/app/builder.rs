//! ControllerBuilder - Controller の構築とワイヤリング
//!
//! 必須の協調者（計算サービス・ホスト・ソルバー統合）は `new` で受け取り、
//! 任意のもの（イベント通知先・時計・設定）はデフォルトを持つ。
//! 設定は `build()` 時に検証する（Fail-fast）。

use std::sync::Arc;

use super::controller::{Controller, ControllerConfig};
use crate::ports::{
    Clock, Connector, EventDelegate, HostEnvironment, NoopDelegate, SolverIntegration,
    SystemClock,
};

/// ControllerBuilder は Controller を構築
///
/// # 使用例
/// ```ignore
/// let controller = ControllerBuilder::new(connector, host, solvers)
///     .events(panel)
///     .config(settings.controller_config())
///     .build()?;
/// ```
pub struct ControllerBuilder {
    connector: Arc<dyn Connector>,
    host: Arc<dyn HostEnvironment>,
    solvers: Arc<dyn SolverIntegration>,
    events: Arc<dyn EventDelegate>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
}

/// BuildError は Controller 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("instance count must be at least 1")]
    NoInstances,

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl ControllerBuilder {
    pub fn new(
        connector: Arc<dyn Connector>,
        host: Arc<dyn HostEnvironment>,
        solvers: Arc<dyn SolverIntegration>,
    ) -> Self {
        Self {
            connector,
            host,
            solvers,
            events: Arc::new(NoopDelegate),
            clock: Arc::new(SystemClock),
            config: ControllerConfig::default(),
        }
    }

    pub fn events(mut self, events: Arc<dyn EventDelegate>) -> Self {
        self.events = events;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// # 検証
    /// - instance_count >= 1
    /// - tag / profile が空でない
    pub fn build(self) -> Result<Controller, BuildError> {
        if self.config.instance_count == 0 {
            return Err(BuildError::NoInstances);
        }
        if self.config.tag.trim().is_empty() {
            return Err(BuildError::Empty("tag"));
        }
        if self.config.profile.trim().is_empty() {
            return Err(BuildError::Empty("profile"));
        }
        Ok(Controller::new(
            self.connector,
            self.host,
            self.solvers,
            self.events,
            self.clock,
            self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryCompute, InMemoryHost, ScriptedSolvers};
    use rstest::rstest;

    fn builder() -> ControllerBuilder {
        let host = Arc::new(InMemoryHost::new());
        let solvers = Arc::new(ScriptedSolvers::new(host.clone()));
        ControllerBuilder::new(Arc::new(InMemoryCompute::new()), host, solvers)
    }

    #[test]
    fn test_build_with_defaults() {
        let controller = builder().build().unwrap();
        assert!(!controller.has_connection());
        assert_eq!(controller.config(), &ControllerConfig::default());
    }

    #[rstest]
    #[case::no_instances(ControllerConfig { instance_count: 0, ..ControllerConfig::default() })]
    #[case::empty_tag(ControllerConfig { tag: " ".into(), ..ControllerConfig::default() })]
    #[case::empty_profile(ControllerConfig { profile: String::new(), ..ControllerConfig::default() })]
    fn test_build_rejects_invalid_config(#[case] config: ControllerConfig) {
        assert!(builder().config(config).build().is_err());
    }
}
