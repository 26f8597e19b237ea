//! Deployment descriptor (firebase.json)
//!
//! Only the functions source directory is read: it is where function builds
//! are redirected when a descriptor is present.

use crate::paths::normalize;
use crate::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct FirebaseJson {
    functions: Option<FunctionsField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FunctionsField {
    Single(FunctionsConfig),
    Codebases(Vec<FunctionsConfig>),
}

#[derive(Debug, Clone, Deserialize)]
struct FunctionsConfig {
    source: Option<String>,
}

/// Serverless deployment layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    /// Path of the descriptor file
    pub path: PathBuf,
    /// Absolute functions source directory
    pub functions_source: PathBuf,
}

impl DeploymentDescriptor {
    /// Load a descriptor if `path` exists.
    ///
    /// Returns `Ok(None)` for a missing file; a present but malformed file is
    /// an error.
    pub fn load_if_exists(path: &Path) -> ConfigResult<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Load a descriptor; the functions source is resolved against the
    /// descriptor's directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let parsed: FirebaseJson =
            serde_json::from_str(&content).map_err(|e| ConfigError::json(path, e))?;

        let config = match parsed.functions {
            Some(FunctionsField::Single(config)) => Some(config),
            Some(FunctionsField::Codebases(configs)) => configs.into_iter().next(),
            None => None,
        };
        let source = config
            .and_then(|c| c.source)
            .ok_or_else(|| ConfigError::missing_field("functions.source", path))?;

        let base = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base = if base.is_absolute() {
            base
        } else {
            std::env::current_dir()?.join(base)
        };

        Ok(Self {
            path: path.to_path_buf(),
            functions_source: normalize(&base.join(source)),
        })
    }
}
