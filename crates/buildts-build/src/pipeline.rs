//! Bundler pipeline assembly
//!
//! A pipeline is an ordered list of capability-tagged stages built from the
//! package manifest and command-line flags. The bundler renders each stage
//! into its own configuration; nothing here talks to the bundler.

use crate::targets::{TargetCategory, TargetDetail};
use buildts_config::package::MANIFEST_FILE;
use buildts_config::PackageDescriptor;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use walkdir::WalkDir;

/// Extensions the resolver tries for extensionless imports
pub const RESOLVE_EXTENSIONS: [&str; 9] = [
    ".cjs", ".mjs", ".js", ".jsx", ".json", ".cts", ".mts", ".ts", ".tsx",
];

/// Files imported as plain strings
pub const TEXT_EXTENSIONS: [&str; 2] = [".csv", ".txt"];

/// Dependency that implies the generated `prisma-client` module
const PRISMA_CLIENT: &str = "@prisma/client";

/// One pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum Stage {
    /// Replace `process.env.NAME` with a JSON string literal
    InlineEnv { definitions: BTreeMap<String, String> },
    /// Leave these modules as runtime imports
    Externals { names: BTreeSet<String> },
    /// Node module resolution
    Resolve { extensions: Vec<String> },
    /// TypeScript (and JSX) to JavaScript
    Transpile { jsx: bool },
    /// Import text files as strings
    TextLoader { extensions: Vec<String> },
    /// Load core-js before the entry module
    Polyfill,
    Minify,
}

impl Stage {
    /// Capability tag, used as the plugin name in diagnostics
    pub fn capability(&self) -> &'static str {
        match self {
            Self::InlineEnv { .. } => "inline-env",
            Self::Externals { .. } => "externals",
            Self::Resolve { .. } => "resolve",
            Self::Transpile { .. } => "transpile",
            Self::TextLoader { .. } => "text-loader",
            Self::Polyfill => "polyfill",
            Self::Minify => "minify",
        }
    }
}

/// Finished pipeline plus the environment handed to the bundler process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub environment: BTreeMap<String, String>,
}

impl Pipeline {
    pub fn capabilities(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::capability).collect()
    }

    pub fn has(&self, capability: &str) -> bool {
        self.stages.iter().any(|stage| stage.capability() == capability)
    }

    /// Externalized module names, empty when there is no externals stage
    pub fn externals(&self) -> BTreeSet<String> {
        self.stages
            .iter()
            .find_map(|stage| match stage {
                Stage::Externals { names } => Some(names.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Builder for [`Pipeline`]
#[derive(Debug, Clone)]
pub struct PipelineBuilder<'a> {
    package: &'a PackageDescriptor,
    category: TargetCategory,
    detail: TargetDetail,
    inline_values: BTreeMap<String, String>,
    extra_externals: Vec<String>,
    core_js: bool,
    minify: bool,
    verbose: bool,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(package: &'a PackageDescriptor, category: TargetCategory, detail: TargetDetail) -> Self {
        Self {
            package,
            category,
            detail,
            inline_values: BTreeMap::new(),
            extra_externals: Vec::new(),
            core_js: false,
            minify: true,
            verbose: false,
        }
    }

    /// Values to inline as `process.env.NAME`
    pub fn inline_values(mut self, values: BTreeMap<String, String>) -> Self {
        self.inline_values = values;
        self
    }

    pub fn extra_externals(mut self, names: Vec<String>) -> Self {
        self.extra_externals = names;
        self
    }

    pub fn core_js(mut self, enabled: bool) -> Self {
        self.core_js = enabled;
        self
    }

    pub fn minify(mut self, enabled: bool) -> Self {
        self.minify = enabled;
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn build(self) -> Pipeline {
        let mut stages = Vec::new();

        if !self.inline_values.is_empty() {
            let definitions = self
                .inline_values
                .iter()
                .map(|(name, value)| (format!("process.env.{name}"), json_string(value)))
                .collect();
            stages.push(Stage::InlineEnv { definitions });
        }

        stages.push(Stage::Externals {
            names: collect_externals(self.package, &self.extra_externals),
        });
        stages.push(Stage::Resolve {
            extensions: RESOLVE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        });
        stages.push(Stage::Transpile {
            jsx: self.detail.uses_jsx(),
        });
        stages.push(Stage::TextLoader {
            extensions: TEXT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        });
        if self.core_js {
            stages.push(Stage::Polyfill);
        }
        if self.minify {
            stages.push(Stage::Minify);
        }

        let mut environment = BTreeMap::new();
        if self.core_js {
            environment.insert("BUILD_TS_COREJS".to_string(), "1".to_string());
        }
        if self.verbose {
            environment.insert("BUILD_TS_VERBOSE".to_string(), "1".to_string());
        }
        environment.insert(
            "BUILD_TS_TARGET_CATEGORY".to_string(),
            self.category.to_string(),
        );
        environment.insert("BUILD_TS_TARGET_DETAIL".to_string(), self.detail.to_string());

        let pipeline = Pipeline {
            stages,
            environment,
        };
        tracing::debug!(stages = ?pipeline.capabilities(), "assembled pipeline");
        pipeline
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Modules left as runtime imports.
///
/// Extra names, the package's runtime/peer/optional dependencies,
/// `prisma-client` for Prisma users, and the dependencies of sibling
/// workspace packages this package depends on. Names in the package's own
/// namespace are always bundled.
pub fn collect_externals(package: &PackageDescriptor, extra: &[String]) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = extra.iter().cloned().collect();

    if package.depends_on(PRISMA_CLIENT) {
        names.insert("prisma-client".to_string());
    }
    names.extend(package.runtime_dependency_names());
    names.extend(sibling_dependency_names(package));

    if let Some(namespace) = package.namespace() {
        names.retain(|name| !in_namespace(name, namespace));
    }
    names
}

/// Dependencies of sibling packages in a monorepo (`<root>/<group>/<pkg>`
/// with a manifest at `<root>`)
fn sibling_dependency_names(package: &PackageDescriptor) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Some(group_dir) = package.package_dir().parent() else {
        return names;
    };
    let is_workspace = group_dir
        .parent()
        .is_some_and(|root| root.join(MANIFEST_FILE).is_file());
    if !is_workspace {
        return names;
    }

    for entry in WalkDir::new(group_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        if entry.path() == package.package_dir() {
            continue;
        }
        let Some(sibling) = read_sibling(entry.path()) else {
            continue;
        };
        let depended = sibling
            .name
            .as_deref()
            .is_some_and(|name| package.depends_on(name));
        if depended {
            names.extend(sibling.runtime_dependency_names());
        }
    }
    names
}

fn read_sibling(dir: &Path) -> Option<PackageDescriptor> {
    let manifest = dir.join(MANIFEST_FILE);
    if !manifest.is_file() {
        return None;
    }
    match PackageDescriptor::read(&manifest) {
        Ok(sibling) => Some(sibling),
        Err(e) => {
            tracing::debug!(path = %manifest.display(), error = %e, "skipping sibling package");
            None
        }
    }
}

/// `ns`, `@ns`, `ns/...` or `@ns/...`
fn in_namespace(name: &str, namespace: &str) -> bool {
    let name = name.strip_prefix('@').unwrap_or(name);
    match name.strip_prefix(namespace) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
