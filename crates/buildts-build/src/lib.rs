//! build-ts build system
//!
//! Turns a package plus command-line flags into written artifacts:
//! - Target classification (app, functions, lib, lib-react)
//! - Output planning (formats, file naming, destinations)
//! - Bundler pipeline assembly (externals, env inlining, transpilation)
//! - The bundler boundary and its `esbuild` implementation
//! - Distributable manifests for function deployments
//! - Build orchestration with parallel artifact writes

pub mod builder;
pub mod bundler;
pub mod error;
pub mod functions;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod specifiers;
pub mod targets;

// Re-export main types
pub use builder::{
    inline_values_from_process, BuildConfig, BuildContext, BuildPhase, BuildStats, Builder,
    PreparedBuild,
};
pub use bundler::{Bundle, BundleRequest, Bundler, CommandBundler, BUNDLER_ENV};
pub use error::{BuildError, BuildResult, BundleDiagnostic, SourceLocation};
pub use functions::{distributable_manifest, write_distributable_manifest};
pub use input::{detect_inputs, name_inputs, NamedInput, DEFAULT_INPUTS};
pub use output::{
    build_plan, is_esm_output, Destination, JsExtension, ModuleFormat, ModuleTypeSelector,
    OutputArtifact, OutputPlan, PlanOptions, DIST_DIR,
};
pub use pipeline::{collect_externals, Pipeline, PipelineBuilder, Stage};
pub use specifiers::rewrite_relative_specifiers;
pub use targets::{classify, classify_str, TargetCategory, TargetDetail};
