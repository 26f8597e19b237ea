//! Distributable manifest for function deployments
//!
//! Functions are deployed from their build output, so the output directory
//! gets its own `package.json`: the package renamed with a `-dist` suffix,
//! `main` pointing at the bundled entry, and no `devDependencies` or
//! `scripts` (the deployment must not rebuild).

use crate::error::{BuildError, BuildResult};
use buildts_config::package::MANIFEST_FILE;
use buildts_config::PackageDescriptor;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to the package name
pub const DIST_NAME_SUFFIX: &str = "-dist";

/// Derive the distributable manifest from the package's raw manifest
pub fn distributable_manifest(
    package: &PackageDescriptor,
    manifest_dir: &Path,
    entry_file: &Path,
) -> Map<String, Value> {
    let mut manifest = package.raw().clone();

    if let Some(name) = &package.name {
        manifest.insert(
            "name".to_string(),
            Value::String(format!("{name}{DIST_NAME_SUFFIX}")),
        );
    }
    manifest.insert(
        "main".to_string(),
        Value::String(relative_slash_path(manifest_dir, entry_file)),
    );
    manifest.shift_remove("devDependencies");
    manifest.shift_remove("scripts");

    manifest
}

/// Write the distributable manifest into `manifest_dir`, creating it if
/// needed. Returns the written path.
pub fn write_distributable_manifest(
    package: &PackageDescriptor,
    manifest_dir: &Path,
    entry_file: &Path,
) -> BuildResult<PathBuf> {
    let manifest = distributable_manifest(package, manifest_dir, entry_file);
    let mut content = serde_json::to_string_pretty(&Value::Object(manifest))?;
    content.push('\n');

    fs::create_dir_all(manifest_dir).map_err(|e| BuildError::io(manifest_dir, e))?;
    let path = manifest_dir.join(MANIFEST_FILE);
    fs::write(&path, content).map_err(|e| BuildError::io(&path, e))?;

    tracing::debug!(path = %path.display(), "wrote distributable manifest");
    Ok(path)
}

/// `target` relative to `base`, with `/` separators
fn relative_slash_path(base: &Path, target: &Path) -> String {
    match pathdiff::diff_paths(target, base) {
        Some(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        None => target.to_string_lossy().replace('\\', "/"),
    }
}
