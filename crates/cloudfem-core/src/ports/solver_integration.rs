//! SolverIntegration port - ホスト側ソルバーモジュールの抽象化
//!
//! 入力ファイルの書き出しと結果の取り込みはホストのソルバーモジュールが持つ。
//! kind ごとの処理は実装側で `SolverKind` を網羅的に match すること。

use std::path::{Path, PathBuf};

use crate::domain::errors::SolverError;
use crate::domain::solver::{SolverKind, SolverRef};

/// What `write_input` produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenInput {
    /// Main input file; required by the calculix kinds.
    pub input_file: Option<PathBuf>,
}

pub trait SolverIntegration: Send + Sync {
    /// Prepare the working directory and return the one actually used.
    ///
    /// `requested` is `None` when the user did not pick a directory.
    fn setup(
        &self,
        solver: &SolverRef,
        kind: SolverKind,
        requested: Option<&Path>,
    ) -> Result<PathBuf, SolverError>;

    /// Check prerequisites and write the input files into `working_dir`.
    fn write_input(
        &self,
        solver: &SolverRef,
        kind: SolverKind,
        working_dir: &Path,
    ) -> Result<WrittenInput, SolverError>;

    /// Import downloaded results into the solver's document.
    fn import_results(
        &self,
        solver: &SolverRef,
        kind: SolverKind,
        working_dir: &Path,
        input_file: Option<&Path>,
    ) -> Result<(), SolverError>;
}
