//! Watch mode - rebuild on file changes until interrupted

use crate::commands::build::destinations;
use crate::context::AppContext;
use crate::report;
use anyhow::{Context, Result};
use buildts_build::{BuildError, Builder, Bundler, PreparedBuild, DIST_DIR};
use notify::{RecursiveMode, Watcher};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Quiet period after a change before rebuilding
const DEBOUNCE_MS: u64 = 300;

/// Everything the watch loop reacts to
#[derive(Debug)]
pub enum WatchEvent {
    Changed(Vec<PathBuf>),
    WatcherError(String),
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    EndOfInput,
}

/// Run the watch loop for a prepared build
pub fn run_watch<B: Bundler>(
    ctx: &AppContext,
    mut builder: Builder<B>,
    prepared: &PreparedBuild,
    package_dir: &Path,
) -> Result<()> {
    let ignored = ignored_roots(package_dir, prepared);
    let (tx, rx) = channel();

    let file_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => WatchEvent::Changed(event.paths),
            Err(e) => WatchEvent::WatcherError(e.to_string()),
        };
        let _ = file_tx.send(event);
    })
    .map_err(|e| BuildError::Watch(format!("failed to create file watcher: {e}")))?;
    watcher
        .watch(package_dir, RecursiveMode::Recursive)
        .map_err(|e| BuildError::Watch(format!("failed to watch {}: {e}", package_dir.display())))?;

    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(WatchEvent::Stop(StopReason::Interrupted));
    })
    .context("Failed to install interrupt handler")?;

    if !io::stdin().is_terminal() {
        let stdin_tx = tx.clone();
        thread::spawn(move || {
            let _ = io::copy(&mut io::stdin().lock(), &mut io::sink());
            let _ = stdin_tx.send(WatchEvent::Stop(StopReason::EndOfInput));
        });
    }
    drop(tx);

    cycle(ctx, &mut builder, prepared, package_dir);
    let reason = watch_loop(&rx, Duration::from_millis(DEBOUNCE_MS), |paths| {
        if paths.iter().any(|path| is_relevant_change(path, &ignored)) {
            cycle(ctx, &mut builder, prepared, package_dir);
        }
    });
    tracing::debug!(reason = ?reason, "leaving watch mode");

    drop(watcher);
    builder.terminate();
    Ok(())
}

/// Dispatch events until a stop request or until every sender is gone.
///
/// Changes arriving within `debounce` of each other are handed to
/// `on_change` as one batch. A stop request during the quiet period wins
/// over the pending rebuild.
pub fn watch_loop<F>(rx: &Receiver<WatchEvent>, debounce: Duration, mut on_change: F) -> Option<StopReason>
where
    F: FnMut(&[PathBuf]),
{
    loop {
        let mut batch = match rx.recv() {
            Ok(WatchEvent::Changed(paths)) => paths,
            Ok(WatchEvent::WatcherError(e)) => {
                tracing::warn!(error = %e, "file watcher error");
                continue;
            }
            Ok(WatchEvent::Stop(reason)) => return Some(reason),
            Err(_) => return None,
        };

        let mut deadline = Instant::now() + debounce;
        loop {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(WatchEvent::Changed(paths)) => {
                    batch.extend(paths);
                    deadline = Instant::now() + debounce;
                }
                Ok(WatchEvent::WatcherError(e)) => {
                    tracing::warn!(error = %e, "file watcher error");
                }
                Ok(WatchEvent::Stop(reason)) => return Some(reason),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    on_change(&batch);
                    return None;
                }
            }
        }
        on_change(&batch);
    }
}

/// One rebuild with banners. Failures are reported and watching continues.
fn cycle<B: Bundler>(
    ctx: &AppContext,
    builder: &mut Builder<B>,
    prepared: &PreparedBuild,
    package_dir: &Path,
) {
    if !ctx.silent {
        println!(
            "{}",
            report::bundles(package_dir, &prepared.input_paths(), &destinations(&prepared.plan))
        );
    }

    let start = Instant::now();
    match builder.bundle(prepared) {
        Ok(context) => {
            if !ctx.silent {
                println!("{}", report::created(package_dir, &context.outputs, start.elapsed()));
            }
        }
        Err(e) => eprintln!("{}", report::failure(&e)),
    }

    if !ctx.silent {
        println!("{}", report::waiting(chrono::Local::now()));
    }
}

/// Directories whose changes never trigger a rebuild: build output,
/// installed dependencies and any redirected deployment directory
fn ignored_roots(package_dir: &Path, prepared: &PreparedBuild) -> Vec<PathBuf> {
    let mut roots = vec![
        package_dir.join(DIST_DIR),
        package_dir.join("node_modules"),
        package_dir.join(".git"),
    ];
    let destination = prepared.plan.destination.path().to_path_buf();
    if !roots.contains(&destination) {
        roots.push(destination);
    }
    roots
}

/// Check if a change should trigger a rebuild
fn is_relevant_change(changed_path: &Path, ignored: &[PathBuf]) -> bool {
    !ignored.iter().any(|root| changed_path.starts_with(root))
}
