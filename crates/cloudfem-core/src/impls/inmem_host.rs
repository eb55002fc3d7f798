//! InMemoryHost - 開発用のホスト環境
//!
//! ドキュメント・オブジェクト・コンソール出力をメモリ上に保持する。
//! CLI のデモとテストで本物の CAD ホストの代わりに使う。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::domain::errors::HostError;
use crate::domain::naming::make_unique_name;
use crate::domain::solver::{DocumentObject, DocumentRef, SolverRef};
use crate::ports::host::{ConsoleLevel, HostEnvironment};

#[derive(Default)]
struct HostState {
    documents: Vec<DocumentRef>,
    solvers: Vec<SolverRef>,
    /// document name -> objects
    objects: HashMap<String, Vec<DocumentObject>>,
    console: Vec<(ConsoleLevel, String)>,
}

#[derive(Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
    data_dir: Option<PathBuf>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::default(),
            data_dir: Some(dir.into()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_document(&self, name: &str, path: impl Into<PathBuf>) -> DocumentRef {
        let doc = DocumentRef::new(name, path);
        let mut state = self.lock();
        state.documents.push(doc.clone());
        state.objects.entry(doc.name.clone()).or_default();
        doc
    }

    /// Close a document; its solvers disappear with it.
    pub fn close_document(&self, name: &str) {
        let mut state = self.lock();
        state.documents.retain(|d| d.name != name);
        state.solvers.retain(|s| s.document.name != name);
        state.objects.remove(name);
    }

    /// Add a solver object to `document`.
    pub fn add_solver(
        &self,
        document: &DocumentRef,
        name: &str,
        label: &str,
        type_id: &str,
    ) -> SolverRef {
        let name = self.add_object(document, name, label);
        let solver = SolverRef {
            document: document.clone(),
            name,
            label: label.to_string(),
            type_id: type_id.to_string(),
        };
        self.lock().solvers.push(solver.clone());
        solver
    }

    /// Add an object and return its (unique) internal name.
    pub fn add_object(&self, document: &DocumentRef, name: &str, label: &str) -> String {
        let mut state = self.lock();
        let objects = state.objects.entry(document.name.clone()).or_default();
        let taken: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        let name = make_unique_name(&taken, name);
        objects.push(DocumentObject {
            name: name.clone(),
            label: label.to_string(),
        });
        name
    }

    pub fn remove_object(&self, document: &DocumentRef, name: &str) {
        let mut state = self.lock();
        if let Some(objects) = state.objects.get_mut(&document.name) {
            objects.retain(|o| o.name != name);
        }
        state
            .solvers
            .retain(|s| !(s.document.name == document.name && s.name == name));
    }

    /// Solver labelled `label` in any open document.
    pub fn solver_by_label(&self, label: &str) -> Option<SolverRef> {
        self.lock().solvers.iter().find(|s| s.label == label).cloned()
    }

    pub fn console(&self) -> Vec<(ConsoleLevel, String)> {
        self.lock().console.clone()
    }

    /// Messages reported at error level.
    pub fn errors(&self) -> Vec<String> {
        self.lock()
            .console
            .iter()
            .filter(|(level, _)| *level == ConsoleLevel::Error)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl HostEnvironment for InMemoryHost {
    fn open_documents(&self) -> Vec<DocumentRef> {
        self.lock().documents.clone()
    }

    fn solver(&self, document_path: &Path, solver_name: &str) -> Option<SolverRef> {
        let document = self.find_document(document_path)?;
        self.lock()
            .solvers
            .iter()
            .find(|s| s.document == document && s.name == solver_name)
            .cloned()
    }

    fn objects(&self, document: &DocumentRef) -> Vec<DocumentObject> {
        self.lock()
            .objects
            .get(&document.name)
            .cloned()
            .unwrap_or_default()
    }

    fn relabel(
        &self,
        document: &DocumentRef,
        object_name: &str,
        label: &str,
    ) -> Result<(), HostError> {
        let mut state = self.lock();
        let objects = state
            .objects
            .get_mut(&document.name)
            .ok_or_else(|| HostError::UnknownDocument(document.name.clone()))?;
        let object = objects
            .iter_mut()
            .find(|o| o.name == object_name)
            .ok_or_else(|| HostError::UnknownObject {
                document: document.name.clone(),
                object: object_name.to_string(),
            })?;
        object.label = label.to_string();
        Ok(())
    }

    fn report(&self, level: ConsoleLevel, message: &str) {
        match level {
            ConsoleLevel::Message => info!(target: "console", "{message}"),
            ConsoleLevel::Warning => warn!(target: "console", "{message}"),
            ConsoleLevel::Error => error!(target: "console", "{message}"),
        }
        self.lock().console.push((level, message.to_string()));
    }

    fn user_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_stay_unique() {
        let host = InMemoryHost::new();
        let doc = host.open_document("Beam", "/tmp/beam.FCStd");
        assert_eq!(host.add_object(&doc, "Result", "Result"), "Result");
        assert_eq!(host.add_object(&doc, "Result", "Result"), "Result1");
    }

    #[test]
    fn solver_lookup_needs_the_document_path() {
        let host = InMemoryHost::new();
        let doc = host.open_document("Beam", "/tmp/beam.FCStd");
        host.add_solver(&doc, "SolverElmer", "Elmer", "Fem::SolverElmer");

        assert!(host.solver(Path::new("/tmp/beam.FCStd"), "SolverElmer").is_some());
        assert!(host.solver(Path::new("/tmp/moved.FCStd"), "SolverElmer").is_none());

        host.close_document("Beam");
        assert!(host.solver(Path::new("/tmp/beam.FCStd"), "SolverElmer").is_none());
    }

    #[test]
    fn relabel_unknown_object_fails() {
        let host = InMemoryHost::new();
        let doc = host.open_document("Beam", "/tmp/beam.FCStd");
        let err = host.relabel(&doc, "Nope", "x").unwrap_err();
        assert!(matches!(err, HostError::UnknownObject { .. }));
    }

    #[test]
    fn console_keeps_levels() {
        let host = InMemoryHost::new();
        host.report(ConsoleLevel::Warning, "careful");
        host.report(ConsoleLevel::Error, "broken");
        assert_eq!(host.console().len(), 2);
        assert_eq!(host.errors(), vec!["broken".to_string()]);
    }
}
