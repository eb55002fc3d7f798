//! Config - 設定の読み込み
//!
//! YAML ファイル（任意）から読み込み、足りない項目はデフォルト値で埋める。
//! 明示パスがなければ `<config_dir>/cloudfem/config.yaml` を探す。

pub mod credential;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::app::controller::ControllerConfig;
use crate::domain::metadata::TOOL_TAG;

pub use self::credential::{Credential, CredentialError, CredentialStore};

/// Directory name under the platform config directory.
pub const APP_DIR: &str = "cloudfem";

const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// User settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interval between two polls while something is computing. 0 disables polling.
    pub poll_interval_ms: u64,

    /// Upper bound of a single remote wait.
    pub wait_timeout_ms: u64,

    /// Tag marking the tasks submitted by this tool.
    pub tag: String,

    /// Execution profile on the compute service.
    pub profile: String,

    /// Compute units per task.
    pub instance_count: u32,

    /// Discard the remote task once its results are loaded.
    pub discard_after_load: bool,

    /// Overrides the per-user data directory (credential file).
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            wait_timeout_ms: 1,
            tag: TOOL_TAG.to_string(),
            profile: "docker-batch".to_string(),
            instance_count: 1,
            discard_after_load: true,
            data_dir: None,
        }
    }
}

impl Settings {
    /// Load from `path`, or from the default location when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.is_file() => p,
                _ => {
                    debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-user data directory: the override, else `<config_dir>/cloudfem`.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::config_dir().map(|d| d.join(APP_DIR)))
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            tag: self.tag.clone(),
            profile: self.profile.clone(),
            instance_count: self.instance_count,
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            discard_after_load: self.discard_after_load,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_plugin() {
        let s = Settings::default();
        assert_eq!(s.poll_interval(), Duration::from_secs(2));
        assert_eq!(s.tag, "FreeCAD macro");
        assert_eq!(s.profile, "docker-batch");
        assert_eq!(s.instance_count, 1);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "poll_interval_ms: 500\ndiscard_after_load: false\n").unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.poll_interval_ms, 500);
        assert!(!s.discard_after_load);
        assert_eq!(s.wait_timeout_ms, 1);
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "poll_interval_ms: [oops").unwrap();

        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn controller_config_carries_settings() {
        let s = Settings {
            wait_timeout_ms: 5,
            tag: "custom".into(),
            ..Settings::default()
        };
        let c = s.controller_config();
        assert_eq!(c.wait_timeout, Duration::from_millis(5));
        assert_eq!(c.tag, "custom");
        assert!(c.discard_after_load);
    }
}
