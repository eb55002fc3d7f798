//! HostEnvironment port - CAD/FEM ホストアプリケーションの抽象化
//!
//! 開いているドキュメント一覧やコンソールはホスト全体の状態だが、
//! グローバルには触らず Controller / TaskRecord に注入する。

use std::path::{Path, PathBuf};

use crate::domain::errors::HostError;
use crate::domain::solver::{DocumentObject, DocumentRef, SolverRef};

/// Severity of a message written to the host console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Message,
    Warning,
    Error,
}

/// The parts of the host application the plugin relies on.
pub trait HostEnvironment: Send + Sync {
    fn open_documents(&self) -> Vec<DocumentRef>;

    /// Solver object `solver_name` in the document opened from `document_path`.
    fn solver(&self, document_path: &Path, solver_name: &str) -> Option<SolverRef>;

    fn objects(&self, document: &DocumentRef) -> Vec<DocumentObject>;

    fn relabel(
        &self,
        document: &DocumentRef,
        object_name: &str,
        label: &str,
    ) -> Result<(), HostError>;

    /// User-visible console.
    fn report(&self, level: ConsoleLevel, message: &str);

    /// Per-user configuration directory.
    fn user_data_dir(&self) -> Option<PathBuf>;

    /// Open document whose file is `path`.
    fn find_document(&self, path: &Path) -> Option<DocumentRef> {
        self.open_documents().into_iter().find(|d| d.path == path)
    }
}
