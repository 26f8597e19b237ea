//! Environment cascade resolution
//!
//! Loads layered `.env` files into a single name → value mapping. Files are
//! read most-specific first and the first file that defines a name wins,
//! across every explicit base path. The result is cached once per process by
//! [`EnvCache`].

use crate::dotenv;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Base path used when no explicit env file is given
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Environment cascade request: explicit base paths plus an optional tag
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvCascade {
    /// Explicit base paths (relative to the working directory or absolute)
    pub paths: Vec<PathBuf>,
    /// Cascade tag. `Some("")` enables cascading without a tag suffix.
    pub tag: Option<String>,
}

impl EnvCascade {
    /// Create a cascade over the given base paths with cascading disabled
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, tag: None }
    }

    /// Enable cascading with the given tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set or clear the cascade tag
    pub fn with_optional_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    /// Whether cascading was requested (an empty tag counts as requested)
    pub fn is_cascading(&self) -> bool {
        self.tag.is_some()
    }

    /// Every file path to read, in precedence order (earlier wins)
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        let bases: Vec<PathBuf> = if self.paths.is_empty() {
            vec![PathBuf::from(DEFAULT_ENV_FILE)]
        } else {
            self.paths.clone()
        };

        bases
            .iter()
            .flat_map(|base| expand_base(base, self.tag.as_deref()))
            .collect()
    }

    /// Load and merge every candidate file relative to `working_dir`.
    ///
    /// Missing or unreadable files are skipped. This always touches the
    /// filesystem; use [`EnvCache`] for the cached, once-per-process view.
    pub fn resolve(&self, working_dir: &Path) -> ResolvedEnvironment {
        let mut vars = BTreeMap::new();

        for candidate in self.candidate_paths() {
            let path = working_dir.join(&candidate);
            let Some(content) = read_env_file(&path) else {
                continue;
            };

            tracing::debug!(file = %path.display(), "loaded env file");

            // Within one file the last definition wins, across files the first.
            let file_vars: BTreeMap<String, String> = dotenv::parse(&content).into_iter().collect();
            for (name, value) in file_vars {
                vars.entry(name).or_insert(value);
            }
        }

        ResolvedEnvironment { vars }
    }
}

/// Expand one base path into its cascade variants.
fn expand_base(base: &Path, tag: Option<&str>) -> Vec<PathBuf> {
    let base = base.to_string_lossy();
    match tag {
        Some(tag) if !tag.is_empty() => vec![
            PathBuf::from(format!("{base}.{tag}.local")),
            PathBuf::from(format!("{base}.local")),
            PathBuf::from(format!("{base}.{tag}")),
            PathBuf::from(base.as_ref()),
        ],
        _ => vec![
            PathBuf::from(format!("{base}.local")),
            PathBuf::from(base.as_ref()),
        ],
    }
}

fn read_env_file(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            tracing::debug!(file = %path.display(), error = %e, "skipping unreadable env file");
            None
        }
    }
}

/// Merged result of an environment cascade
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedEnvironment {
    vars: BTreeMap<String, String>,
}

impl ResolvedEnvironment {
    /// Look up a resolved value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Whether a name was resolved
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Number of resolved names
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether nothing was resolved
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Resolved names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Resolved pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write resolved values into the process environment.
    ///
    /// Names that are already set in the process environment keep their
    /// ambient value. Returns the names that were written.
    pub fn apply_to_process(&self) -> Vec<String> {
        let mut applied = Vec::new();
        for (name, value) in &self.vars {
            if env::var_os(name).is_some() {
                continue;
            }
            env::set_var(name, value);
            applied.push(name.clone());
        }
        applied
    }
}

impl FromIterator<(String, String)> for ResolvedEnvironment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Process-lifetime cache for the resolved environment.
///
/// The first call to [`EnvCache::get_or_resolve`] resolves the cascade; every
/// later call returns the same mapping without touching the filesystem, even
/// if the arguments differ.
#[derive(Debug, Default)]
pub struct EnvCache {
    resolved: OnceLock<ResolvedEnvironment>,
    resolutions: AtomicUsize,
}

impl EnvCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the cascade on first use, then return the cached mapping
    pub fn get_or_resolve(&self, cascade: &EnvCascade, working_dir: &Path) -> &ResolvedEnvironment {
        self.resolved.get_or_init(|| {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                files = ?cascade.candidate_paths(),
                cascade = cascade.is_cascading(),
                "resolving env cascade"
            );
            cascade.resolve(working_dir)
        })
    }

    /// The cached mapping, if already resolved
    pub fn get(&self) -> Option<&ResolvedEnvironment> {
        self.resolved.get()
    }

    /// Pre-seed the cache. Fails with the given mapping if already resolved.
    pub fn inject(&self, env: ResolvedEnvironment) -> Result<(), ResolvedEnvironment> {
        self.resolved.set(env)
    }

    /// Drop the cached mapping so the next access resolves again
    pub fn reset(&mut self) {
        self.resolved.take();
        self.resolutions.store(0, Ordering::SeqCst);
    }

    /// How many times the cascade was actually resolved
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

/// Names of package-manager injected variables among `vars`.
///
/// Matches `npm_*`, `yarn_*` and `berry_*` case-insensitively, plus
/// `INIT_CWD` and `PROJECT_CWD`.
pub fn package_manager_vars<I, K>(vars: I) -> Vec<String>
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    vars.into_iter()
        .filter(|name| is_package_manager_var(name.as_ref()))
        .map(|name| name.as_ref().to_string())
        .collect()
}

fn is_package_manager_var(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with("NPM_")
        || upper.starts_with("YARN_")
        || upper.starts_with("BERRY_")
        || upper == "INIT_CWD"
        || upper == "PROJECT_CWD"
}

/// Remove package-manager injected variables from the process environment
/// so they cannot shadow values declared in env files. Returns the removed
/// names.
pub fn strip_package_manager_vars() -> Vec<String> {
    if let (Some(path), Some(berry_bin)) = (env::var_os("PATH"), env::var_os("BERRY_BIN_FOLDER")) {
        let entries: Vec<PathBuf> = env::split_paths(&path)
            .filter(|entry| entry.as_os_str() != berry_bin.as_os_str())
            .collect();
        if let Ok(joined) = env::join_paths(entries) {
            env::set_var("PATH", joined);
        }
    }

    let names = package_manager_vars(env::vars_os().filter_map(|(k, _)| k.into_string().ok()));
    for name in &names {
        env::remove_var(name);
    }
    if !names.is_empty() {
        tracing::debug!(count = names.len(), "removed package manager variables");
    }
    names
}
