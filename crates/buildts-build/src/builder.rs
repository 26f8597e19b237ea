//! Build orchestration
//!
//! [`Builder`] walks one build through its phases:
//!
//! ```text
//! Idle → ResolvingPackage → ClassifyingTarget → PlanningOutputs
//!      → PipelineAssembly → Bundling → Success | Failed
//! ```
//!
//! Everything before `Bundling` is pure planning and never touches the
//! output directory. Watch mode calls [`Builder::bundle`] repeatedly with the
//! same [`PreparedBuild`] and finishes with [`Builder::terminate`].
use crate::bundler::{Bundle, BundleRequest, Bundler};
use crate::error::{BuildError, BuildResult};
use crate::functions::write_distributable_manifest;
use crate::input::{detect_inputs, name_inputs, NamedInput};
use crate::output::{build_plan, JsExtension, ModuleTypeSelector, OutputPlan, PlanOptions};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::targets::{classify, TargetCategory, TargetDetail};

use buildts_config::{DeploymentDescriptor, PackageDescriptor};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Phase of a build invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    ResolvingPackage,
    ClassifyingTarget,
    PlanningOutputs,
    PipelineAssembly,
    Bundling,
    /// Watch mode is shutting down
    Terminating,
    Success,
    Failed,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ResolvingPackage => "resolving-package",
            Self::ClassifyingTarget => "classifying-target",
            Self::PlanningOutputs => "planning-outputs",
            Self::PipelineAssembly => "pipeline-assembly",
            Self::Bundling => "bundling",
            Self::Terminating => "terminating",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Build configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub category: TargetCategory,
    /// Explicit entry points, relative to `working_dir`
    pub inputs: Vec<PathBuf>,
    /// Directory explicit inputs are resolved against
    pub working_dir: PathBuf,
    pub module_type: Option<ModuleTypeSelector>,
    pub js_extension: Option<JsExtension>,
    pub sourcemap: bool,
    pub minify: bool,
    /// Inject core-js polyfills
    pub core_js: bool,
    pub verbose: bool,
    /// Additional externalized module names
    pub externals: Vec<String>,
    /// Names whose process environment value is inlined
    pub inline_env: BTreeSet<String>,
    /// Deployment descriptor (`firebase.json`) that may redirect functions
    pub deployment_descriptor: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            category: TargetCategory::App,
            inputs: Vec::new(),
            working_dir: PathBuf::from("."),
            module_type: None,
            js_extension: None,
            sourcemap: true,
            minify: true,
            core_js: false,
            verbose: false,
            externals: Vec::new(),
            inline_env: BTreeSet::new(),
            deployment_descriptor: None,
        }
    }
}

/// Everything decided before bundling
#[derive(Debug, Clone)]
pub struct PreparedBuild {
    pub package: PackageDescriptor,
    pub detail: TargetDetail,
    pub inputs: Vec<NamedInput>,
    pub plan: OutputPlan,
    pub pipeline: Pipeline,
}

impl PreparedBuild {
    pub fn input_paths(&self) -> Vec<&Path> {
        self.inputs.iter().map(|input| input.path.as_path()).collect()
    }
}

/// Build context - result of a successful build
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub detail: TargetDetail,
    /// Written output paths in plan order
    pub outputs: Vec<PathBuf>,
    /// Generated distributable manifest (functions)
    pub manifest: Option<PathBuf>,
    pub stats: BuildStats,
}

/// Build statistics
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub artifact_count: usize,
    /// Time to build the module graph
    pub bundle_time: Duration,
    /// Time writing artifacts
    pub write_time: Duration,
    pub total_time: Duration,
}

/// Closes a bundle on every exit path
struct BundleGuard(Box<dyn Bundle>);

impl Drop for BundleGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            tracing::warn!(error = %e, "failed to close bundle");
        }
    }
}

/// Main builder for orchestrating builds
pub struct Builder<B: Bundler> {
    package_dir: PathBuf,
    config: BuildConfig,
    bundler: B,
    phase: BuildPhase,
    watching: bool,
}

impl<B: Bundler> Builder<B> {
    /// Create a builder for the package at `package_dir`
    pub fn new(package_dir: impl AsRef<Path>, bundler: B) -> Self {
        Self {
            package_dir: package_dir.as_ref().to_path_buf(),
            config: BuildConfig::default(),
            bundler,
            phase: BuildPhase::Idle,
            watching: false,
        }
    }

    /// Set build configuration
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep the builder in `Bundling` between cycles; a failed cycle does
    /// not end the build
    pub fn with_watch(mut self, watching: bool) -> Self {
        self.watching = watching;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    fn enter(&mut self, phase: BuildPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "build phase");
        self.phase = phase;
    }

    /// Single-shot build: prepare, then bundle once
    pub fn build(&mut self) -> BuildResult<BuildContext> {
        let prepared = self.prepare()?;
        self.bundle(&prepared)
    }

    /// Run every planning phase. Fails before any output is touched.
    pub fn prepare(&mut self) -> BuildResult<PreparedBuild> {
        let result = self.prepare_phases();
        if result.is_err() {
            self.enter(BuildPhase::Failed);
        }
        result
    }

    fn prepare_phases(&mut self) -> BuildResult<PreparedBuild> {
        self.enter(BuildPhase::ResolvingPackage);
        let package = PackageDescriptor::read(&self.package_dir)?;
        let deployment = match &self.config.deployment_descriptor {
            Some(path) => DeploymentDescriptor::load_if_exists(path)?,
            None => None,
        };

        self.enter(BuildPhase::ClassifyingTarget);
        let inputs = detect_inputs(
            &self.config.inputs,
            &self.config.working_dir,
            package.package_dir(),
        )?;
        let detail = classify(self.config.category, &inputs[0]);
        tracing::info!(detail = %detail, category = %self.config.category, "resolved target");

        self.enter(BuildPhase::PlanningOutputs);
        let plan = build_plan(
            detail,
            &package,
            &PlanOptions {
                module_type: self.config.module_type,
                js_extension: self.config.js_extension,
                sourcemap: self.config.sourcemap,
                deployment,
                input_count: inputs.len(),
            },
        )?;

        self.enter(BuildPhase::PipelineAssembly);
        let pipeline = PipelineBuilder::new(&package, self.config.category, detail)
            .inline_values(inline_values_from_process(&self.config.inline_env))
            .extra_externals(self.config.externals.clone())
            .core_js(self.config.core_js)
            .minify(self.config.minify)
            .verbose(self.config.verbose)
            .build();

        Ok(PreparedBuild {
            inputs: name_inputs(detail, &inputs),
            package,
            detail,
            plan,
            pipeline,
        })
    }

    /// Prepare the destination, build the bundle and write every artifact.
    ///
    /// Clearing the destination runs alongside the bundler; both finish
    /// before the first write. The bundle is closed even when writing fails.
    pub fn bundle(&mut self, prepared: &PreparedBuild) -> BuildResult<BuildContext> {
        self.enter(BuildPhase::Bundling);
        let result = self.bundle_once(prepared);
        if !self.watching {
            self.enter(if result.is_ok() {
                BuildPhase::Success
            } else {
                BuildPhase::Failed
            });
        }
        result
    }

    fn bundle_once(&self, prepared: &PreparedBuild) -> BuildResult<BuildContext> {
        let start = Instant::now();
        let request = BundleRequest {
            package_dir: prepared.package.package_dir().to_path_buf(),
            inputs: prepared.inputs.clone(),
            detail: prepared.detail,
            environment: prepared.pipeline.environment.clone(),
            pipeline: prepared.pipeline.clone(),
            sourcemap: self.config.sourcemap,
        };

        let destination = &prepared.plan.destination;
        let bundler = &self.bundler;
        let (prepared_dir, bundled) = rayon::join(
            || destination.prepare(),
            || bundler.bundle(&request),
        );
        let guard = BundleGuard(bundled?);
        let bundle_time = start.elapsed();
        prepared_dir.map_err(|e| BuildError::io(destination.path(), e))?;
        let bundle = guard.0.as_ref();

        let manifest = match &prepared.plan.manifest_dir {
            Some(dir) => Some(write_distributable_manifest(
                &prepared.package,
                dir,
                &prepared.plan.artifacts[0].entry_file(),
            )?),
            None => None,
        };

        let write_start = Instant::now();
        prepared
            .plan
            .artifacts
            .par_iter()
            .try_for_each(|artifact| bundle.write(artifact))?;
        let write_time = write_start.elapsed();
        drop(guard);

        let outputs: Vec<PathBuf> = prepared
            .plan
            .destinations()
            .into_iter()
            .map(Path::to_path_buf)
            .collect();
        tracing::info!(outputs = ?outputs, "build complete");

        Ok(BuildContext {
            detail: prepared.detail,
            stats: BuildStats {
                artifact_count: outputs.len(),
                bundle_time,
                write_time,
                total_time: start.elapsed(),
            },
            outputs,
            manifest,
        })
    }

    /// Generate only the distributable manifest of a functions package
    pub fn write_manifest_only(&mut self) -> BuildResult<PathBuf> {
        self.enter(BuildPhase::ResolvingPackage);
        let package = PackageDescriptor::read(&self.package_dir)?;
        let deployment = match &self.config.deployment_descriptor {
            Some(path) => DeploymentDescriptor::load_if_exists(path)?,
            None => None,
        };

        self.enter(BuildPhase::PlanningOutputs);
        let plan = build_plan(
            TargetDetail::Functions,
            &package,
            &PlanOptions {
                module_type: self.config.module_type,
                js_extension: self.config.js_extension,
                sourcemap: self.config.sourcemap,
                deployment,
                input_count: self.config.inputs.len().max(1),
            },
        )?;

        let manifest_dir = plan
            .manifest_dir
            .clone()
            .unwrap_or_else(|| plan.destination.path().to_path_buf());
        let path = write_distributable_manifest(&package, &manifest_dir, &plan.artifacts[0].entry_file())?;
        self.enter(BuildPhase::Success);
        Ok(path)
    }

    /// Leave watch mode
    pub fn terminate(&mut self) {
        self.enter(BuildPhase::Terminating);
        self.enter(BuildPhase::Success);
    }
}

/// Current process values of `names`; unset names are skipped
pub fn inline_values_from_process(names: &BTreeSet<String>) -> BTreeMap<String, String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
        .collect()
}
