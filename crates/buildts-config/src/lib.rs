//! build-ts Configuration System
//!
//! Provides the configuration inputs of a build:
//! - Layered `.env` files (the environment cascade)
//! - The process-lifetime environment cache
//! - Package manifests (`package.json`)
//! - Deployment descriptors (`firebase.json`)
//!
//! # Environment Cascade
//!
//! For a base path `.env` and a cascade tag `production`, files are read in
//! this order and the first file defining a name wins:
//! 1. `.env.production.local`
//! 2. `.env.local`
//! 3. `.env.production`
//! 4. `.env`
//!
//! # Example
//!
//! ```no_run
//! use buildts_config::{EnvCache, EnvCascade};
//! use std::path::Path;
//!
//! let cache = EnvCache::new();
//! let cascade = EnvCascade::new(Vec::new()).with_tag("production");
//! let env = cache.get_or_resolve(&cascade, Path::new("."));
//! println!("{} variables", env.len());
//! ```

pub mod deploy;
pub mod dotenv;
pub mod env;
pub mod package;
pub mod paths;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("package.json not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse {file}: {error}")]
    JsonParseError {
        file: PathBuf,
        error: serde_json::Error,
    },

    #[error("Missing required field '{field}' in {file}")]
    MissingField { field: String, file: PathBuf },
}

impl ConfigError {
    /// Create a JSON parse error for the given file
    pub fn json(file: impl Into<PathBuf>, error: serde_json::Error) -> Self {
        Self::JsonParseError {
            file: file.into(),
            error,
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self::MissingField {
            field: field.into(),
            file: file.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use deploy::DeploymentDescriptor;
pub use env::{
    package_manager_vars, strip_package_manager_vars, EnvCache, EnvCascade, ResolvedEnvironment,
};
pub use package::{ModuleType, PackageDescriptor};
