//! Run command - execute a TypeScript file with node and the tsx loader

use crate::context::AppContext;
use anyhow::{Context, Result};
use buildts_config::PackageDescriptor;
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, ExitStatus};

/// Node executable
const NODE: &str = "node";

/// Module system used to load the script
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModuleKind {
    Cjs,
    Esm,
}

/// Run command arguments
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Script to run
    pub file: PathBuf,

    /// Module type (detected from the file extension or package.json by default)
    #[arg(long, short = 'm', value_enum)]
    pub module: Option<ModuleKind>,

    /// Restart on file changes (node --watch)
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Run a script and exit with its status
pub fn run(ctx: &AppContext, args: &RunArgs) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    ctx.environment(&cwd);

    let module = detect_module_type(&args.file, args.module);
    let node_args = node_arguments(&args.file, module, args.watch, &args.args);
    if ctx.verbose {
        eprintln!("Running '{} {}'", NODE, node_args.join(" "));
    }
    tracing::debug!(args = ?node_args, module = ?module, "spawning node");

    let status = Command::new(NODE)
        .args(&node_args)
        .env("NODE_NO_WARNINGS", "1")
        .status()
        .with_context(|| format!("Failed to spawn '{NODE}'"))?;
    Ok(exit_code(status))
}

/// Explicit flag, then `.cts`/`.mts`, then the nearest package.json `type`
pub fn detect_module_type(file: &Path, explicit: Option<ModuleKind>) -> ModuleKind {
    if let Some(kind) = explicit {
        return kind;
    }
    match file.extension().and_then(|ext| ext.to_str()) {
        Some("cts") => return ModuleKind::Cjs,
        Some("mts") => return ModuleKind::Esm,
        _ => {}
    }

    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    match PackageDescriptor::find_upward(&dir) {
        Ok(package) if package.is_esm() => ModuleKind::Esm,
        Ok(_) => ModuleKind::Cjs,
        Err(e) => {
            tracing::debug!(error = %e, "no usable package.json, assuming cjs");
            ModuleKind::Cjs
        }
    }
}

/// Arguments of the node process
pub fn node_arguments(file: &Path, module: ModuleKind, watch: bool, extra: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    if watch {
        args.push("--watch".to_string());
    }
    match module {
        ModuleKind::Esm => args.extend(["--import".to_string(), "tsx".to_string()]),
        ModuleKind::Cjs => args.extend(["--require".to_string(), "tsx/cjs".to_string()]),
    }
    args.push(file.display().to_string());
    args.extend(extra.iter().cloned());
    args
}

/// The child's exit code, or 1 when it was killed by a signal
fn exit_code(status: ExitStatus) -> ExitCode {
    status
        .code()
        .map(|code| ExitCode::from(u8::try_from(code).unwrap_or(1)))
        .unwrap_or(ExitCode::from(1))
}
