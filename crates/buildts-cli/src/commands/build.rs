//! Build commands - `app`, `functions`, `lib` and `build --target`

use crate::commands::watch;
use crate::context::AppContext;
use crate::report;
use anyhow::{Context, Result};
use buildts_build::{BuildConfig, Builder, JsExtension, ModuleTypeSelector, TargetCategory};
use buildts_config::package::MANIFEST_FILE;
use buildts_config::paths::normalize;
use clap::{ArgAction, Args};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Flags shared by every build command
#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Package directory or package.json path (default: current directory)
    pub package: Option<PathBuf>,

    /// Entry point(s), relative to the current directory (default: src/index.{ts,tsx})
    #[arg(long, short = 'i', value_name = "FILE")]
    pub input: Vec<PathBuf>,

    /// Inject core-js polyfills
    #[arg(long = "core-js")]
    pub core_js: bool,

    /// Minify output
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub minify: bool,

    /// Emit source maps
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub sourcemap: bool,

    /// Additional external dependencies (repeatable)
    #[arg(long, value_name = "NAME")]
    pub external: Vec<String>,

    /// Module type: cjs, esm, either or both
    #[arg(long, short = 'm', value_name = "TYPE")]
    pub module_type: Option<ModuleTypeSelector>,

    /// Plain .js extension policy: either, both or none
    #[arg(long, short = 'j', value_name = "POLICY")]
    pub js_extension: Option<JsExtension>,

    /// Rebuild on file changes
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Environment variable to inline as process.env.NAME (repeatable)
    #[arg(long = "env-var", value_name = "NAME")]
    pub env_var: Vec<String>,
}

/// Flags of the functions target
#[derive(Debug, Clone, Args)]
pub struct FunctionsArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// firebase.json whose functions.source receives the output
    #[arg(long, short = 'f', value_name = "PATH", env = "BUILD_TS_FIREBASE")]
    pub firebase: Option<PathBuf>,

    /// Only generate the distributable package.json
    #[arg(long)]
    pub only_package_json: bool,
}

impl BuildArgs {
    /// Absolute package directory; a `package.json` path names its directory
    pub fn package_dir(&self, cwd: &Path) -> PathBuf {
        let location = cwd.join(self.package.as_deref().unwrap_or(Path::new(".")));
        let dir = if location.file_name().is_some_and(|name| name == MANIFEST_FILE) {
            location.parent().map(Path::to_path_buf).unwrap_or(location)
        } else {
            location
        };
        normalize(&dir)
    }

    fn to_config(
        &self,
        category: TargetCategory,
        cwd: &Path,
        inline_env: BTreeSet<String>,
        firebase: Option<&Path>,
    ) -> BuildConfig {
        BuildConfig {
            category,
            inputs: self.input.clone(),
            working_dir: cwd.to_path_buf(),
            module_type: self.module_type,
            js_extension: self.js_extension,
            sourcemap: self.sourcemap,
            minify: self.minify,
            core_js: self.core_js,
            verbose: false,
            externals: self.external.clone(),
            inline_env,
            deployment_descriptor: firebase.map(|path| cwd.join(path)),
        }
    }
}

/// Run a build of `category`
pub fn run(
    ctx: &AppContext,
    category: TargetCategory,
    args: &BuildArgs,
    firebase: Option<&Path>,
) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let package_dir = args.package_dir(&cwd);

    let env = ctx.environment(&package_dir);
    let mut inline_env: BTreeSet<String> = args.env_var.iter().cloned().collect();
    inline_env.extend(env.names().map(str::to_string));

    let config = BuildConfig {
        verbose: ctx.verbose,
        ..args.to_config(category, &cwd, inline_env, firebase)
    };
    let mut builder = Builder::new(&package_dir, ctx.bundler())
        .with_config(config)
        .with_watch(args.watch);

    let prepared = builder.prepare()?;
    if ctx.verbose {
        eprintln!("Target (Category): {} ({})", prepared.detail, category);
        eprintln!(
            "OutputOptions: {}",
            serde_json::to_string_pretty(&prepared.plan)?
        );
    }

    if args.watch {
        return watch::run_watch(ctx, builder, &prepared, &package_dir);
    }

    if !ctx.silent {
        println!(
            "{}",
            report::bundles(
                &package_dir,
                &prepared.input_paths(),
                &destinations(&prepared.plan)
            )
        );
    }

    let start = Instant::now();
    let context = builder
        .bundle(&prepared)
        .context("Failed to build due to")?;

    if !ctx.silent {
        println!(
            "{}",
            report::created(&package_dir, &context.outputs, start.elapsed())
        );
    }
    Ok(())
}

/// `functions --only-package-json`
pub fn write_manifest(ctx: &AppContext, args: &FunctionsArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let package_dir = args.build.package_dir(&cwd);

    let config = args.build.to_config(
        TargetCategory::Functions,
        &cwd,
        BTreeSet::new(),
        args.firebase.as_deref(),
    );
    let path = Builder::new(&package_dir, ctx.bundler())
        .with_config(config)
        .write_manifest_only()?;

    if !ctx.silent {
        println!(
            "{}",
            report::created(&package_dir, &[path], std::time::Duration::ZERO)
        );
    }
    Ok(())
}

pub(crate) fn destinations(plan: &buildts_build::OutputPlan) -> Vec<PathBuf> {
    plan.destinations()
        .into_iter()
        .map(Path::to_path_buf)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        build: BuildArgs,
    }

    fn parse(args: &[&str]) -> BuildArgs {
        TestCli::parse_from(std::iter::once("test").chain(args.iter().copied())).build
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert!(args.minify);
        assert!(args.sourcemap);
        assert!(!args.core_js);
        assert!(args.module_type.is_none());
        assert!(args.input.is_empty());
    }

    #[test]
    fn test_boolean_flags_take_optional_values() {
        let args = parse(&["--minify", "false", "--sourcemap"]);
        assert!(!args.minify);
        assert!(args.sourcemap);
    }

    #[test]
    fn test_module_type_and_extension() {
        let args = parse(&["-m", "either", "-j", "none", "--external", "sharp", "--external", "pg"]);
        assert_eq!(args.module_type, Some(ModuleTypeSelector::Either));
        assert_eq!(args.js_extension, Some(JsExtension::PerFormat));
        assert_eq!(args.external, vec!["sharp", "pg"]);
    }

    #[test]
    fn test_invalid_module_type_rejected() {
        assert!(TestCli::try_parse_from(["test", "--module-type", "umd"]).is_err());
    }

    #[test]
    fn test_package_dir() {
        let cwd = Path::new("/work");
        assert_eq!(parse(&[]).package_dir(cwd), PathBuf::from("/work"));
        assert_eq!(
            parse(&["packages/api"]).package_dir(cwd),
            PathBuf::from("/work/packages/api")
        );
        assert_eq!(
            parse(&["../lib/package.json"]).package_dir(cwd),
            PathBuf::from("/lib")
        );
    }

    #[test]
    fn test_firebase_path_resolved_against_cwd() {
        let config = parse(&[]).to_config(
            TargetCategory::Functions,
            Path::new("/work"),
            BTreeSet::new(),
            Some(Path::new("firebase.json")),
        );
        assert_eq!(
            config.deployment_descriptor,
            Some(PathBuf::from("/work/firebase.json"))
        );
    }
}
