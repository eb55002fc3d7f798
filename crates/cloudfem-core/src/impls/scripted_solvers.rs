//! ScriptedSolvers - 開発用のソルバー統合
//!
//! 実ファイルシステム上に入力ファイルを書き出し、結果の取り込みでは
//! ホストにオブジェクトを追加する。失敗は事前に仕込める。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::inmem_host::InMemoryHost;
use crate::domain::errors::SolverError;
use crate::domain::solver::{SolverKind, SolverRef};
use crate::ports::solver_integration::{SolverIntegration, WrittenInput};

#[derive(Default)]
struct Script {
    write_failure: Option<String>,
    import_failure: Option<String>,
}

pub struct ScriptedSolvers {
    host: Arc<InMemoryHost>,
    script: Mutex<Script>,
}

impl ScriptedSolvers {
    pub fn new(host: Arc<InMemoryHost>) -> Self {
        Self {
            host,
            script: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every following `write_input` fail.
    pub fn fail_write(&self, message: &str) {
        self.lock().write_failure = Some(message.to_string());
    }

    pub fn fail_import(&self, message: &str) {
        self.lock().import_failure = Some(message.to_string());
    }

    /// Default working directory when the user picked none.
    fn default_dir(solver: &SolverRef) -> PathBuf {
        std::env::temp_dir()
            .join("cloudfem")
            .join(format!("{}_{}", solver.document.name, solver.name))
    }

    /// Labels of the objects a result import creates.
    fn result_labels(kind: SolverKind) -> &'static [&'static str] {
        match kind {
            SolverKind::CcxTools | SolverKind::Calculix => &["CCX_Results", "ResultMesh"],
            SolverKind::Elmer => &["ElmerResult"],
            SolverKind::Z88 => &["Z88_Results", "ResultMesh"],
        }
    }

    fn input_file_name(solver: &SolverRef, kind: SolverKind) -> String {
        match kind {
            SolverKind::CcxTools | SolverKind::Calculix => format!("{}.inp", solver.name),
            SolverKind::Elmer => "case.sif".to_string(),
            SolverKind::Z88 => "z88i1.txt".to_string(),
        }
    }
}

impl SolverIntegration for ScriptedSolvers {
    fn setup(
        &self,
        solver: &SolverRef,
        _kind: SolverKind,
        requested: Option<&Path>,
    ) -> Result<PathBuf, SolverError> {
        let dir = requested
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::default_dir(solver));
        fs::create_dir_all(&dir).map_err(|e| SolverError::WorkingDir {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(dir)
    }

    fn write_input(
        &self,
        solver: &SolverRef,
        kind: SolverKind,
        working_dir: &Path,
    ) -> Result<WrittenInput, SolverError> {
        if let Some(message) = self.lock().write_failure.clone() {
            return Err(SolverError::Write(message));
        }
        let path = working_dir.join(Self::input_file_name(solver, kind));
        fs::write(&path, format!("** {} input for {}\n", kind, solver.label))
            .map_err(|e| SolverError::Write(e.to_string()))?;
        debug!(path = %path.display(), "input written");

        let input_file = kind.requires_input_file().then_some(path);
        Ok(WrittenInput { input_file })
    }

    fn import_results(
        &self,
        solver: &SolverRef,
        kind: SolverKind,
        working_dir: &Path,
        _input_file: Option<&Path>,
    ) -> Result<(), SolverError> {
        if let Some(message) = self.lock().import_failure.clone() {
            return Err(SolverError::Import(message));
        }
        let has_files = fs::read_dir(working_dir)
            .map_err(|e| SolverError::Import(e.to_string()))?
            .next()
            .is_some();
        if !has_files {
            return Err(SolverError::Import(format!(
                "no results in {}",
                working_dir.display()
            )));
        }
        for label in Self::result_labels(kind) {
            self.host.add_object(&solver.document, label, label);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::host::HostEnvironment;

    fn fixture(type_id: &str) -> (Arc<InMemoryHost>, ScriptedSolvers, SolverRef) {
        let host = Arc::new(InMemoryHost::new());
        let doc = host.open_document("Beam", "/tmp/beam.FCStd");
        let solver = host.add_solver(&doc, "SolverCalculix", "CalculiX", type_id);
        let solvers = ScriptedSolvers::new(host.clone());
        (host, solvers, solver)
    }

    #[test]
    fn calculix_input_file_is_returned() {
        let (_host, solvers, solver) = fixture("Fem::SolverCalculix");
        let dir = tempfile::tempdir().unwrap();

        let written = solvers
            .write_input(&solver, SolverKind::Calculix, dir.path())
            .unwrap();
        let input = written.input_file.unwrap();
        assert!(input.is_file());
        assert_eq!(input.file_name().unwrap(), "SolverCalculix.inp");
    }

    #[test]
    fn elmer_has_no_input_file() {
        let (_host, solvers, solver) = fixture("Fem::SolverElmer");
        let dir = tempfile::tempdir().unwrap();
        let written = solvers
            .write_input(&solver, SolverKind::Elmer, dir.path())
            .unwrap();
        assert!(written.input_file.is_none());
    }

    #[test]
    fn import_adds_objects_to_the_document() {
        let (host, solvers, solver) = fixture("Fem::SolverCalculix");
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("result.frd"), "").unwrap();

        solvers
            .import_results(&solver, SolverKind::Calculix, dir.path(), None)
            .unwrap();
        let names: Vec<String> = host
            .objects(&solver.document)
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert!(names.contains(&"CCX_Results".to_string()));
    }

    #[test]
    fn import_from_an_empty_directory_fails() {
        let (_host, solvers, solver) = fixture("Fem::SolverCalculix");
        let dir = tempfile::tempdir().unwrap();
        let err = solvers
            .import_results(&solver, SolverKind::Calculix, dir.path(), None)
            .unwrap_err();
        assert!(matches!(err, SolverError::Import(_)));
    }
}
