//! Invocation-wide state shared by every command

use crate::config::Config;
use buildts_build::CommandBundler;
use buildts_config::{EnvCache, EnvCascade, ResolvedEnvironment};
use clap::Args;
use std::path::{Path, PathBuf};

/// Tag used by `--auto-cascade-env` when `NODE_ENV` is unset
pub const DEFAULT_CASCADE_TAG: &str = "development";

/// Flags accepted by every subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Suppress banners (stronger than --verbose)
    #[arg(long, short = 's', global = true, env = "BUILD_TS_SILENT")]
    pub silent: bool,

    /// .env files to load (repeatable, default: .env)
    #[arg(long = "env", value_name = "PATH", global = true)]
    pub env_files: Vec<PathBuf>,

    /// Cascade .env files for this environment (e.g. .env.<TAG>.local, .env.<TAG>)
    #[arg(long, value_name = "TAG", global = true, env = "BUILD_TS_CASCADE_ENV")]
    pub cascade_env: Option<String>,

    /// Cascade .env files for NODE_ENV. Preferred over --cascade-env
    #[arg(long, global = true)]
    pub cascade_node_env: bool,

    /// Cascade .env files for NODE_ENV, or "development" when unset
    #[arg(long, global = true)]
    pub auto_cascade_env: bool,
}

impl GlobalArgs {
    /// The env cascade these flags describe
    pub fn cascade(&self, node_env: Option<&str>) -> EnvCascade {
        EnvCascade::new(self.env_files.clone()).with_optional_tag(cascade_tag(
            self.cascade_node_env,
            self.cascade_env.as_deref(),
            self.auto_cascade_env,
            node_env,
        ))
    }
}

/// Pick the cascade tag: `--cascade-node-env` (only when NODE_ENV is set),
/// then `--cascade-env`, then `--auto-cascade-env`.
pub fn cascade_tag(
    cascade_node_env: bool,
    cascade_env: Option<&str>,
    auto_cascade_env: bool,
    node_env: Option<&str>,
) -> Option<String> {
    if cascade_node_env {
        if let Some(tag) = node_env {
            return Some(tag.to_string());
        }
    }
    if let Some(tag) = cascade_env {
        return Some(tag.to_string());
    }
    auto_cascade_env.then(|| node_env.unwrap_or(DEFAULT_CASCADE_TAG).to_string())
}

/// Shared state of one `build-ts` invocation
pub struct AppContext {
    pub config: Config,
    /// Verbose output requested and not silenced
    pub verbose: bool,
    pub silent: bool,
    cascade: EnvCascade,
    env: EnvCache,
}

impl AppContext {
    pub fn new(config: Config, global: &GlobalArgs) -> Self {
        let node_env = std::env::var("NODE_ENV").ok();
        Self {
            config,
            verbose: global.verbose && !global.silent,
            silent: global.silent,
            cascade: global.cascade(node_env.as_deref()),
            env: EnvCache::new(),
        }
    }

    /// The resolved env cascade. The first call loads the files relative to
    /// `working_dir` and applies them to the process environment; later calls
    /// return the same mapping.
    pub fn environment(&self, working_dir: &Path) -> &ResolvedEnvironment {
        let first = self.env.get().is_none();
        let resolved = self.env.get_or_resolve(&self.cascade, working_dir);
        if first {
            let applied = resolved.apply_to_process();
            tracing::debug!(
                resolved = resolved.len(),
                applied = applied.len(),
                "loaded env files"
            );
            if self.verbose {
                eprintln!("Loading env files: {:?}", self.cascade.candidate_paths());
            }
        }
        resolved
    }

    /// Bundler honoring BUILD_TS_BUNDLER
    pub fn bundler(&self) -> CommandBundler {
        match &self.config.bundler {
            Some(executable) => CommandBundler::with_executable(executable),
            None => CommandBundler::new(),
        }
    }
}
