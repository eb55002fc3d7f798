//! Solver model: the host's solver objects and the closed set of solver kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::errors::{SolverError, TaskError};

/// A document open in the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Internal (unique) document name.
    pub name: String,

    /// File the document was loaded from / saved to.
    pub path: PathBuf,
}

impl DocumentRef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// An object inside a host document (only what the plugin needs to see).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentObject {
    /// Internal name, unique within the document.
    pub name: String,

    /// User-visible label.
    pub label: String,
}

/// Reference to a solver configuration object owned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverRef {
    pub document: DocumentRef,

    /// Internal object name (stable across sessions, stored in task metadata).
    pub name: String,

    /// User-visible label (used for generated task names).
    pub label: String,

    /// Declared solver type, e.g. `Fem::SolverCcxTools`.
    pub type_id: String,
}

/// The solver kinds that can run remotely.
///
/// Each kind decides how inputs are written, which container runs the
/// solver, and how results come back. Writing and importing belong to the
/// solver integration; the container profile lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Legacy calculix tool chain (keeps its own input file name).
    CcxTools,
    Elmer,
    Calculix,
    Z88,
}

/// Container image and command line for the remote execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub image: String,
    pub command: String,
}

const CALCULIX_IMAGE: &str = "calculix/ccx";
const ELMER_IMAGE: &str = "nwrichmond/elmerice";
const Z88_IMAGE: &str = "adlf/z88os";

impl SolverKind {
    /// Resolve the kind from the solver object's declared type.
    pub fn from_type_id(type_id: &str) -> Result<Self, TaskError> {
        match type_id {
            "Fem::SolverCcxTools" => Ok(SolverKind::CcxTools),
            "Fem::SolverElmer" => Ok(SolverKind::Elmer),
            "Fem::SolverCalculix" => Ok(SolverKind::Calculix),
            "Fem::SolverZ88" => Ok(SolverKind::Z88),
            other => Err(TaskError::UnsupportedSolver(other.to_string())),
        }
    }

    pub fn type_id(self) -> &'static str {
        match self {
            SolverKind::CcxTools => "Fem::SolverCcxTools",
            SolverKind::Elmer => "Fem::SolverElmer",
            SolverKind::Calculix => "Fem::SolverCalculix",
            SolverKind::Z88 => "Fem::SolverZ88",
        }
    }

    /// The tool-based kind stores its input file name in the task metadata.
    pub fn is_tool_based(self) -> bool {
        matches!(self, SolverKind::CcxTools)
    }

    /// Calculix kinds pass the input file stem on the command line.
    pub fn requires_input_file(self) -> bool {
        matches!(self, SolverKind::CcxTools | SolverKind::Calculix)
    }

    /// Container profile for this kind.
    ///
    /// `input_stem` is the input file name without directory or extension;
    /// calculix kinds cannot run without it.
    pub fn execution(self, input_stem: Option<&str>) -> Result<ExecutionProfile, SolverError> {
        let (image, command) = match self {
            SolverKind::CcxTools | SolverKind::Calculix => {
                let stem = input_stem.ok_or(SolverError::MissingInputFile(self))?;
                (
                    CALCULIX_IMAGE,
                    format!("bash -c \"export OMP_NUM_THREADS=$(nproc) && ccx -i {stem}\""),
                )
            }
            SolverKind::Elmer => (
                ELMER_IMAGE,
                "bash -c \"/usr/local/Elmer-devel/bin/ElmerSolver\"".to_string(),
            ),
            SolverKind::Z88 => (
                Z88_IMAGE,
                "bash -c \"z88r -t -choly && z88r -c -choly\"".to_string(),
            ),
        };
        Ok(ExecutionProfile {
            image: image.to_string(),
            command,
        })
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_id())
    }
}

/// `/tmp/run/Static.inp` -> `Static`, `mesh.part.inp` -> `mesh`.
pub fn input_stem(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ccx_tools("Fem::SolverCcxTools", SolverKind::CcxTools)]
    #[case::elmer("Fem::SolverElmer", SolverKind::Elmer)]
    #[case::calculix("Fem::SolverCalculix", SolverKind::Calculix)]
    #[case::z88("Fem::SolverZ88", SolverKind::Z88)]
    fn kinds_resolve_from_type_id(#[case] type_id: &str, #[case] kind: SolverKind) {
        assert_eq!(SolverKind::from_type_id(type_id).unwrap(), kind);
        assert_eq!(kind.type_id(), type_id);
    }

    #[test]
    fn unknown_type_id_is_rejected() {
        let err = SolverKind::from_type_id("Fem::SolverMystran").unwrap_err();
        assert!(matches!(err, TaskError::UnsupportedSolver(t) if t == "Fem::SolverMystran"));
    }

    #[test]
    fn calculix_command_uses_input_stem() {
        let profile = SolverKind::Calculix.execution(Some("Static")).unwrap();
        assert_eq!(profile.image, "calculix/ccx");
        assert!(profile.command.ends_with("ccx -i Static\""));
    }

    #[test]
    fn calculix_without_input_file_cannot_run() {
        let err = SolverKind::CcxTools.execution(None).unwrap_err();
        assert!(matches!(err, SolverError::MissingInputFile(SolverKind::CcxTools)));
    }

    #[test]
    fn elmer_and_z88_ignore_input_stem() {
        let elmer = SolverKind::Elmer.execution(None).unwrap();
        assert_eq!(elmer.image, "nwrichmond/elmerice");

        let z88 = SolverKind::Z88.execution(Some("ignored")).unwrap();
        assert_eq!(z88.image, "adlf/z88os");
        assert!(z88.command.contains("z88r -t -choly && z88r -c -choly"));
    }

    #[rstest]
    #[case::plain("/tmp/run/Static.inp", Some("Static"))]
    #[case::double_ext("mesh.part.inp", Some("mesh"))]
    #[case::hidden("/tmp/.inp", None)]
    fn input_stem_cuts_at_first_dot(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(input_stem(Path::new(path)).as_deref(), expected);
    }
}
