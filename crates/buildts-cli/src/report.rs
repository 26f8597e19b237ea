//! User-facing build banners

use buildts_build::BuildError;
use chrono::{DateTime, Local};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `a, b` with each path shown relative to `base` when it lies below it
pub fn relative_list<P: AsRef<Path>>(base: &Path, paths: &[P]) -> String {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            path.strip_prefix(base).unwrap_or(path).display().to_string()
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Start banner: `Bundles <inputs> → <outputs>` followed by the package dir
pub fn bundles(package_dir: &Path, inputs: &[&Path], outputs: &[PathBuf]) -> String {
    format!(
        "Bundles {} → {}\non {} ...",
        relative_list(package_dir, inputs).bold(),
        relative_list(package_dir, outputs).bold(),
        package_dir.display()
    )
    .cyan()
    .to_string()
}

/// Completion banner
pub fn created(package_dir: &Path, outputs: &[PathBuf], elapsed: Duration) -> String {
    format!(
        "Created {} in {}",
        relative_list(package_dir, outputs).bold(),
        format_elapsed(elapsed).bold()
    )
    .green()
    .to_string()
}

/// Printed after every watch cycle
pub fn waiting(now: DateTime<Local>) -> String {
    format!("\n[{}] waiting for changes...", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Failure report of one build
pub fn failure(error: &BuildError) -> String {
    format!("{} {}", "Failed to build due to:".red().bold(), error)
}

/// `850ms`, `1.2s`, `2m 5s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
