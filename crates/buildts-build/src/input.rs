//! Entry point detection

use crate::error::{BuildError, BuildResult};
use crate::targets::TargetDetail;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Conventional entry points, tried in order under the package directory
pub const DEFAULT_INPUTS: [&str; 2] = ["src/index.ts", "src/index.tsx"];

/// An entry point together with the output chunk name it produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedInput {
    pub name: String,
    pub path: PathBuf,
}

/// Determine the entry points of a build.
///
/// Explicit inputs are resolved against `cwd`. Otherwise the conventional
/// entry points under `package_dir` are tried; finding none is an error.
pub fn detect_inputs(explicit: &[PathBuf], cwd: &Path, package_dir: &Path) -> BuildResult<Vec<PathBuf>> {
    if !explicit.is_empty() {
        return Ok(explicit.iter().map(|input| cwd.join(input)).collect());
    }

    DEFAULT_INPUTS
        .iter()
        .map(|candidate| package_dir.join(candidate))
        .find(|candidate| candidate.is_file())
        .map(|input| vec![input])
        .ok_or_else(|| BuildError::NoInput {
            candidates: DEFAULT_INPUTS.iter().map(|c| c.to_string()).collect(),
        })
}

/// Name entry points for the bundler.
///
/// Functions name their first input `index` so the deployed entry is stable;
/// every other input is named after its file stem.
pub fn name_inputs(detail: TargetDetail, inputs: &[PathBuf]) -> Vec<NamedInput> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let name = if index == 0 && detail == TargetDetail::Functions {
                "index".to_string()
            } else {
                file_stem(path)
            };
            NamedInput {
                name,
                path: path.clone(),
            }
        })
        .collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string())
}
