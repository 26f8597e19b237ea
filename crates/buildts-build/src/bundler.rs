//! Bundler boundary
//!
//! The orchestrator only sees [`Bundler`] and [`Bundle`]. [`CommandBundler`]
//! drives an external `esbuild` executable; tests plug in an in-memory
//! implementation.

use crate::error::{BuildError, BuildResult, BundleDiagnostic};
use crate::input::NamedInput;
use crate::output::{ModuleFormat, OutputArtifact};
use crate::pipeline::{Pipeline, Stage};
use crate::specifiers::rewrite_relative_specifiers;
use crate::targets::TargetDetail;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use walkdir::WalkDir;

/// Environment variable naming an explicit bundler executable
pub const BUNDLER_ENV: &str = "BUILD_TS_BUNDLER";

/// Executable name looked up in `node_modules/.bin` and on `PATH`
pub const BUNDLER_EXECUTABLE: &str = "esbuild";

/// Relative specifiers left unbundled in preserved module trees
const RELATIVE_EXTERNALS: [&str; 2] = ["./*", "../*"];

/// Source extensions considered modules when preserving module structure
const MODULE_EXTENSIONS: [&str; 8] = ["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Everything a bundler needs to build the module graph
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub package_dir: PathBuf,
    pub inputs: Vec<NamedInput>,
    pub detail: TargetDetail,
    pub pipeline: Pipeline,
    /// Environment of the bundler process
    pub environment: BTreeMap<String, String>,
    pub sourcemap: bool,
}

/// Produces a bundle from a request
pub trait Bundler: Send + Sync {
    fn bundle(&self, request: &BundleRequest) -> BuildResult<Box<dyn Bundle>>;
}

/// A built module graph that can be written to several artifacts
pub trait Bundle: Send + Sync {
    fn write(&self, artifact: &OutputArtifact) -> BuildResult<()>;

    /// Release resources held by the bundle
    fn close(&self) -> BuildResult<()> {
        Ok(())
    }
}

/// Bundler backed by the `esbuild` command line
#[derive(Debug, Clone, Default)]
pub struct CommandBundler {
    executable: Option<PathBuf>,
}

impl CommandBundler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of searching for one
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(executable.into()),
        }
    }

    /// Find the executable: explicit path, then `node_modules/.bin` in the
    /// package or any ancestor, then `PATH`
    pub fn locate(&self, package_dir: &Path) -> BuildResult<PathBuf> {
        if let Some(executable) = &self.executable {
            return Ok(executable.clone());
        }

        for dir in package_dir.ancestors() {
            let candidate = dir.join("node_modules").join(".bin").join(BUNDLER_EXECUTABLE);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        which::which(BUNDLER_EXECUTABLE).map_err(|e| {
            BuildError::BundlerNotFound(format!(
                "{BUNDLER_EXECUTABLE} ({e}); install it in the package or set {BUNDLER_ENV}"
            ))
        })
    }
}

impl Bundler for CommandBundler {
    fn bundle(&self, request: &BundleRequest) -> BuildResult<Box<dyn Bundle>> {
        let executable = self.locate(&request.package_dir)?;

        for input in &request.inputs {
            if !input.path.is_file() {
                return Err(BuildError::Bundle(
                    BundleDiagnostic::new(format!(
                        "Could not resolve entry module \"{}\"",
                        input.path.display()
                    ))
                    .with_name("Error"),
                ));
            }
        }

        let modules = source_modules(&request.package_dir.join("src"));
        tracing::debug!(
            executable = %executable.display(),
            modules = modules.len(),
            "prepared bundle"
        );

        Ok(Box::new(CommandBundle {
            executable,
            request: request.clone(),
            modules,
        }))
    }
}

/// Module files under `src_dir`, excluding declarations and tests
fn source_modules(src_dir: &Path) -> Vec<PathBuf> {
    let mut modules: Vec<PathBuf> = WalkDir::new(src_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != "__tests__" && e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| is_module(path))
        .collect();
    modules.sort();
    modules
}

fn is_module(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let has_module_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext));
    let is_declaration = name.ends_with(".d.ts") || name.ends_with(".d.mts") || name.ends_with(".d.cts");
    let is_test = name.contains(".test.") || name.contains(".spec.");
    has_module_ext && !is_declaration && !is_test
}

struct CommandBundle {
    executable: PathBuf,
    request: BundleRequest,
    modules: Vec<PathBuf>,
}

impl Bundle for CommandBundle {
    fn write(&self, artifact: &OutputArtifact) -> BuildResult<()> {
        let args = render_args(&self.request, &self.modules, artifact);
        tracing::debug!(
            executable = %self.executable.display(),
            args = ?args,
            "running bundler"
        );

        let output = Command::new(&self.executable)
            .args(&args)
            .current_dir(&self.request.package_dir)
            .envs(&self.request.environment)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BuildError::io(&self.executable, e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(BuildError::Bundle(parse_diagnostic(
                &stderr,
                output.status.code(),
            )));
        }
        if !stderr.trim().is_empty() {
            tracing::warn!(output = %artifact.destination().display(), "{}", stderr.trim());
        }
        if artifact.preserves_modules() {
            rewrite_relative_specifiers(artifact.destination(), &artifact.extension())?;
        }
        Ok(())
    }
}

/// Command-line arguments writing one artifact
pub fn render_args(request: &BundleRequest, modules: &[PathBuf], artifact: &OutputArtifact) -> Vec<String> {
    let mut args = Vec::new();
    let format = artifact.format();

    match artifact {
        OutputArtifact::File { path, .. } => {
            if let Some(input) = request.inputs.first() {
                args.push(input.path.display().to_string());
            }
            args.push("--bundle".to_string());
            args.push(format!("--outfile={}", path.display()));
        }
        OutputArtifact::Directory {
            dir,
            preserve_modules: true,
            ..
        } => {
            let entries: Vec<&PathBuf> = if modules.is_empty() {
                request.inputs.iter().map(|input| &input.path).collect()
            } else {
                modules.iter().collect()
            };
            args.extend(entries.iter().map(|path| path.display().to_string()));
            args.push("--bundle".to_string());
            args.push(format!("--outdir={}", dir.display()));
            args.push("--outbase=src".to_string());
            // every module is its own entry point; siblings stay separate files
            args.extend(RELATIVE_EXTERNALS.iter().map(|p| format!("--external:{p}")));
        }
        OutputArtifact::Directory { dir, .. } => {
            args.extend(
                request
                    .inputs
                    .iter()
                    .map(|input| format!("{}={}", input.name, input.path.display())),
            );
            args.push("--bundle".to_string());
            args.push(format!("--outdir={}", dir.display()));
        }
    }

    if matches!(artifact, OutputArtifact::Directory { .. }) {
        let extension = artifact.extension();
        if extension != "js" {
            args.push(format!("--out-extension:.js=.{extension}"));
        }
    }

    args.push(format!(
        "--format={}",
        match format {
            ModuleFormat::CommonJs => "cjs",
            ModuleFormat::Esm => "esm",
        }
    ));
    if artifact.sourcemap() {
        args.push("--sourcemap".to_string());
    }

    for stage in &request.pipeline.stages {
        render_stage(stage, format, &mut args);
    }
    args.push("--log-level=warning".to_string());
    args
}

fn render_stage(stage: &Stage, format: ModuleFormat, args: &mut Vec<String>) {
    match stage {
        Stage::InlineEnv { definitions } => {
            args.extend(
                definitions
                    .iter()
                    .map(|(name, value)| format!("--define:{name}={value}")),
            );
        }
        Stage::Externals { names } => {
            args.extend(names.iter().map(|name| format!("--external:{name}")));
        }
        Stage::Resolve { extensions } => {
            args.push("--platform=node".to_string());
            args.push(format!("--resolve-extensions={}", extensions.join(",")));
        }
        Stage::Transpile { jsx } => {
            if *jsx {
                args.push("--jsx=automatic".to_string());
            }
        }
        Stage::TextLoader { extensions } => {
            args.extend(extensions.iter().map(|ext| format!("--loader:{ext}=text")));
        }
        Stage::Polyfill => {
            let banner = match format {
                ModuleFormat::CommonJs => "require('core-js/stable');",
                ModuleFormat::Esm => "import 'core-js/stable';",
            };
            args.push(format!("--banner:js={banner}"));
        }
        Stage::Minify => args.push("--minify".to_string()),
    }
}

/// Parse bundler error output into a diagnostic.
///
/// Recognizes the first `[ERROR]` block:
///
/// ```text
/// ✘ [ERROR] Could not resolve "x" [plugin env]
///
///     src/index.ts:1:7:
///       1 │ import x from "x";
///         ╵               ~~~
/// ```
pub fn parse_diagnostic(stderr: &str, status: Option<i32>) -> BundleDiagnostic {
    let lines: Vec<&str> = stderr.lines().collect();
    let Some(start) = lines.iter().position(|line| line.contains("[ERROR]")) else {
        let message = match status {
            Some(code) => format!("bundler exited with status {code}"),
            None => "bundler was terminated by a signal".to_string(),
        };
        let mut diagnostic = BundleDiagnostic::new(message).with_name("Error");
        if !stderr.trim().is_empty() {
            diagnostic = diagnostic.with_stack(stderr.trim_end());
        }
        return diagnostic;
    };

    let headline = lines[start]
        .split_once("[ERROR]")
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();
    let (message, plugin) = split_plugin(headline);
    let mut diagnostic = BundleDiagnostic::new(message).with_name("Error");
    if let Some(plugin) = plugin {
        diagnostic = diagnostic.with_plugin(plugin);
    }

    let mut frame = Vec::new();
    let mut notes = Vec::new();
    for line in lines[start + 1..].iter().take_while(|l| !is_next_message(l)) {
        if line.trim().is_empty() {
            continue;
        }
        if diagnostic.loc.is_none() && frame.is_empty() {
            if let Some((file, line_no, column)) = parse_location(line.trim()) {
                diagnostic = diagnostic.with_location(Some(file), line_no, column);
                continue;
            }
        }
        if diagnostic.loc.is_some() && (line.contains('│') || line.contains('╵')) {
            frame.push(line.trim_start_matches("    ").trim_end());
        } else {
            notes.push(line.trim());
        }
    }

    if !frame.is_empty() {
        diagnostic = diagnostic.with_frame(frame.join("\n"));
    }
    if !notes.is_empty() {
        diagnostic = diagnostic.with_stack(notes.join("\n"));
    }
    diagnostic
}

/// `message [plugin name]` → (`message`, `name`)
fn split_plugin(headline: &str) -> (String, Option<String>) {
    if let Some(stripped) = headline.strip_suffix(']') {
        if let Some((message, plugin)) = stripped.rsplit_once(" [plugin ") {
            return (message.trim().to_string(), Some(plugin.to_string()));
        }
    }
    (headline.to_string(), None)
}

/// `path:line:column:`
fn parse_location(line: &str) -> Option<(String, u32, u32)> {
    let rest = line.strip_suffix(':')?;
    let (rest, column) = rest.rsplit_once(':')?;
    let (file, line_no) = rest.rsplit_once(':')?;
    if file.is_empty() {
        return None;
    }
    Some((file.to_string(), line_no.parse().ok()?, column.parse().ok()?))
}

fn is_next_message(line: &str) -> bool {
    line.contains("[ERROR]")
        || line.contains("[WARNING]")
        || line
            .trim()
            .split_once(' ')
            .is_some_and(|(count, rest)| {
                count.parse::<u32>().is_ok() && (rest.starts_with("error") || rest.starts_with("warning"))
            })
}
