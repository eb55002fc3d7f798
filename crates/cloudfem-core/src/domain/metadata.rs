//! Remote task metadata used to recognise and recover tasks.
//!
//! タスク送信時に constants として書き込み、再接続時に読み戻す。
//! キー名はリモート側に永続化されるので変更しないこと。

use std::collections::BTreeMap;

/// Tag attached to every task submitted by this tool.
pub const TOOL_TAG: &str = "FreeCAD macro";

/// File path of the document holding the solver.
pub const DOCUMENT_KEY: &str = "FREECAD_DOCUMENT";

/// Internal name of the solver object.
pub const SOLVER_KEY: &str = "FREECAD_SOLVER";

/// Local working directory the inputs came from and results go to.
pub const WORKING_DIR_KEY: &str = "FREECAD_WORKING_DIR";

/// Input file of the tool-based calculix solver.
pub const CCX_TOOLS_INPUT_KEY: &str = "CCX_TOOLS_INP_FILENAME";

/// Container image run by the compute service.
pub const DOCKER_REPO_KEY: &str = "DOCKER_REPO";

/// Command line run inside the container.
pub const DOCKER_CMD_KEY: &str = "DOCKER_CMD";

/// Marker in the solver object name identifying the tool-based solver.
const TOOL_BASED_SOLVER_MARKER: &str = "CcxTools";

pub type Constants = BTreeMap<String, String>;

/// Keys a task needs to be reattached to local state, in check order.
///
/// The tool-based input key is only required once the solver key is
/// present and names a tool-based solver.
pub fn missing_keys(constants: &Constants) -> Vec<&'static str> {
    let mut missing: Vec<&'static str> = [DOCUMENT_KEY, SOLVER_KEY, WORKING_DIR_KEY]
        .into_iter()
        .filter(|key| !constants.contains_key(*key))
        .collect();

    if let Some(solver) = constants.get(SOLVER_KEY)
        && solver.contains(TOOL_BASED_SOLVER_MARKER)
        && !constants.contains_key(CCX_TOOLS_INPUT_KEY)
    {
        missing.push(CCX_TOOLS_INPUT_KEY);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants(pairs: &[(&str, &str)]) -> Constants {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn all_base_keys_present_is_complete() {
        let c = constants(&[
            (DOCUMENT_KEY, "/home/u/beam.FCStd"),
            (SOLVER_KEY, "SolverElmer"),
            (WORKING_DIR_KEY, "/tmp/beam"),
        ]);
        assert!(missing_keys(&c).is_empty());
    }

    #[test]
    fn missing_working_dir_is_reported() {
        let c = constants(&[
            (DOCUMENT_KEY, "/home/u/beam.FCStd"),
            (SOLVER_KEY, "SolverCcxTools"),
            (CCX_TOOLS_INPUT_KEY, "/tmp/beam/SolverCcxTools.inp"),
        ]);
        assert_eq!(missing_keys(&c), vec![WORKING_DIR_KEY]);
    }

    #[test]
    fn tool_based_solver_needs_input_key() {
        let c = constants(&[
            (DOCUMENT_KEY, "/home/u/beam.FCStd"),
            (SOLVER_KEY, "SolverCcxTools001"),
            (WORKING_DIR_KEY, "/tmp/beam"),
        ]);
        assert_eq!(missing_keys(&c), vec![CCX_TOOLS_INPUT_KEY]);
    }

    #[test]
    fn input_key_not_required_without_solver_key() {
        let c = constants(&[(DOCUMENT_KEY, "/home/u/beam.FCStd")]);
        assert_eq!(missing_keys(&c), vec![SOLVER_KEY, WORKING_DIR_KEY]);
    }
}
