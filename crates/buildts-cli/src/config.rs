//! CLI configuration via environment variables
//!
//! build-ts reads a handful of optional settings from the environment.
//! Everything else comes from flags.

use std::env;
use std::path::PathBuf;

/// Filter directives for log output (`BUILD_TS_LOG=debug`)
pub const LOG_ENV: &str = "BUILD_TS_LOG";

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Log filter directives (BUILD_TS_LOG)
    pub log_filter: Option<String>,
    /// Disable colored output (BUILD_TS_NO_COLOR=1 or NO_COLOR=1)
    pub no_color: bool,
    /// Bundler executable override (BUILD_TS_BUNDLER=/path/to/esbuild)
    pub bundler: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            log_filter: env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty()),
            no_color: env::var_os("BUILD_TS_NO_COLOR").is_some()
                || env::var_os("NO_COLOR").is_some(),
            bundler: env::var_os(buildts_build::BUNDLER_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Filter used when BUILD_TS_LOG is unset. `silent` wins over `verbose`.
    pub fn default_log_level(verbose: bool, silent: bool) -> &'static str {
        if silent {
            "error"
        } else if verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
