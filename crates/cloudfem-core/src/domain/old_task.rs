//! OldTaskRecord - 以前のセッションで送信されたリモートタスク
//!
//! 完全性（復元に必要なメタデータが揃っているか）は構築時に一度だけ判定する。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::ids::{BucketId, RemoteTaskId};
use super::metadata::{
    CCX_TOOLS_INPUT_KEY, Constants, DOCUMENT_KEY, SOLVER_KEY, WORKING_DIR_KEY, missing_keys,
};
use super::task::purge_remote_task;
use crate::ports::compute::{ComputeConnection, RemoteTask};
use crate::ports::host::HostEnvironment;

#[derive(Debug, Clone)]
pub struct OldTaskRecord {
    remote: RemoteTask,
    missing: Vec<&'static str>,
}

impl OldTaskRecord {
    pub fn new(remote: RemoteTask) -> Self {
        let missing = missing_keys(&remote.constants);
        Self { remote, missing }
    }

    /// Does the metadata carry everything needed to recover the task?
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing_keys(&self) -> &[&'static str] {
        &self.missing
    }

    pub fn id(&self) -> &RemoteTaskId {
        &self.remote.id
    }

    pub fn name(&self) -> &str {
        &self.remote.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.remote.created_at
    }

    pub fn constants(&self) -> &Constants {
        &self.remote.constants
    }

    pub fn tags(&self) -> &[String] {
        &self.remote.tags
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.constant(DOCUMENT_KEY).map(Path::new)
    }

    pub fn solver_name(&self) -> Option<&str> {
        self.constant(SOLVER_KEY)
    }

    pub fn working_dir(&self) -> Option<PathBuf> {
        self.constant(WORKING_DIR_KEY).map(PathBuf::from)
    }

    pub fn ccx_input_file(&self) -> Option<PathBuf> {
        self.constant(CCX_TOOLS_INPUT_KEY).map(PathBuf::from)
    }

    pub fn resources(&self) -> &[BucketId] {
        &self.remote.resources
    }

    pub fn results(&self) -> Option<&BucketId> {
        self.remote.results.as_ref()
    }

    fn constant(&self, key: &str) -> Option<&str> {
        self.remote.constants.get(key).map(String::as_str)
    }

    /// Abort and delete the remote task with its buckets.
    pub async fn discard(&self, conn: &dyn ComputeConnection, host: &dyn HostEnvironment) {
        purge_remote_task(conn, self.id(), host).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::compute::RemoteTaskState;
    use rstest::rstest;

    fn remote(pairs: &[(&str, &str)]) -> RemoteTask {
        RemoteTask {
            id: RemoteTaskId::new("t-old"),
            name: "Beam_10.00.00".into(),
            state: RemoteTaskState::Executing,
            created_at: Utc::now(),
            tags: vec!["FreeCAD macro".into()],
            constants: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            resources: vec![BucketId::new("in")],
            results: Some(BucketId::new("out")),
            errors: Vec::new(),
        }
    }

    const DOC: (&str, &str) = (DOCUMENT_KEY, "/home/u/beam.FCStd");
    const ELMER: (&str, &str) = (SOLVER_KEY, "SolverElmer");
    const CCX: (&str, &str) = (SOLVER_KEY, "SolverCcxTools");
    const DIR: (&str, &str) = (WORKING_DIR_KEY, "/tmp/beam");
    const INP: (&str, &str) = (CCX_TOOLS_INPUT_KEY, "/tmp/beam/SolverCcxTools.inp");

    #[rstest]
    #[case::elmer(vec![DOC, ELMER, DIR], true)]
    #[case::ccx_tools(vec![DOC, CCX, DIR, INP], true)]
    #[case::ccx_tools_without_input(vec![DOC, CCX, DIR], false)]
    #[case::no_working_dir(vec![DOC, CCX, INP], false)]
    #[case::no_document(vec![ELMER, DIR], false)]
    #[case::nothing(vec![], false)]
    fn completeness(#[case] pairs: Vec<(&str, &str)>, #[case] complete: bool) {
        assert_eq!(OldTaskRecord::new(remote(&pairs)).is_complete(), complete);
    }

    #[test]
    fn missing_working_dir_is_named() {
        let old = OldTaskRecord::new(remote(&[DOC, CCX, INP]));
        assert_eq!(old.missing_keys(), &[WORKING_DIR_KEY]);
        assert!(old.working_dir().is_none());
    }

    #[test]
    fn accessors_read_the_metadata() {
        let old = OldTaskRecord::new(remote(&[DOC, CCX, DIR, INP]));
        assert_eq!(old.document_path(), Some(Path::new("/home/u/beam.FCStd")));
        assert_eq!(old.solver_name(), Some("SolverCcxTools"));
        assert_eq!(old.working_dir(), Some(PathBuf::from("/tmp/beam")));
        assert_eq!(
            old.ccx_input_file(),
            Some(PathBuf::from("/tmp/beam/SolverCcxTools.inp"))
        );
        assert_eq!(old.resources(), &[BucketId::new("in")]);
        assert_eq!(old.results(), Some(&BucketId::new("out")));
    }
}
