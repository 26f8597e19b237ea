use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod context;
mod report;

use buildts_build::TargetCategory;
use commands::build::{BuildArgs, FunctionsArgs};
use commands::run::RunArgs;
use context::{AppContext, GlobalArgs};

/// Build TypeScript applications, functions and libraries.
///
/// build-ts wraps a bundler with conventions: entry points are detected from
/// `src/index.{ts,tsx}`, output goes to `dist/`, dependencies stay external
/// and `.env` files are loaded (and optionally cascaded) before building.
///
/// EXAMPLES:
///     build-ts app                       Build the app in the current directory
///     build-ts lib packages/ui -m both   Build a library in CJS and ESM
///     build-ts functions -f firebase.json
///     build-ts run src/seed.ts --cascade-env=production
///
/// ENVIRONMENT VARIABLES:
///     BUILD_TS_LOG      Log filter (e.g. 'debug' or 'buildts_build=trace')
///     BUILD_TS_BUNDLER  Path of the esbuild executable
///     NO_COLOR          Set to disable colored output
#[derive(Parser)]
#[command(name = "build-ts")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a Node.js application
    ///
    /// Bundles the entry point into the file named by `main` under dist/.
    ///
    /// EXAMPLES:
    ///     build-ts app                    Build ./package.json
    ///     build-ts app -m esm -j either   Emit ESM with a plain .js extension
    ///     build-ts app --watch            Rebuild on changes
    App(BuildArgs),

    /// Build a GCP/Firebase functions app
    ///
    /// Like `app`, plus a distributable package.json next to the bundle.
    /// With --firebase the output goes to the functions source directory.
    ///
    /// EXAMPLES:
    ///     build-ts functions -f ../firebase.json
    ///     build-ts functions --only-package-json
    Functions(FunctionsArgs),

    /// Build a Node.js / React library
    ///
    /// Emits dist/cjs and/or dist/esm trees that mirror the source modules.
    /// A `.tsx` entry point builds a React library.
    ///
    /// EXAMPLES:
    ///     build-ts lib                    CJS and ESM
    ///     build-ts lib -m either          Only the package's own module type
    Lib(BuildArgs),

    /// Build a package for a target given by name
    ///
    /// EXAMPLES:
    ///     build-ts build -t lib packages/utils
    Build {
        /// Target category: app, functions or lib
        #[arg(long, short = 't', value_name = "TARGET")]
        target: String,

        #[command(flatten)]
        args: BuildArgs,

        /// firebase.json for functions targets
        #[arg(long, short = 'f', value_name = "PATH")]
        firebase: Option<std::path::PathBuf>,
    },

    /// Run a TypeScript script with node
    ///
    /// Loads .env files first. Exits with the script's status.
    ///
    /// EXAMPLES:
    ///     build-ts run src/seed.ts
    ///     build-ts run src/server.ts --watch -- --port 3000
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     build-ts completions bash > ~/.bash_completions/build-ts.bash
    ///     build-ts completions zsh > ~/.zfunc/_build-ts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cli_config = config::Config::from_env();
    init_logging(&cli_config, &cli.global);
    if cli_config.no_color {
        colored::control::set_override(false);
    }

    let removed = buildts_config::strip_package_manager_vars();
    tracing::debug!(count = removed.len(), "removed package manager variables");

    let ctx = AppContext::new(cli_config, &cli.global);
    match run(&ctx, cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(ctx: &AppContext, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::App(args) => commands::build::run(ctx, TargetCategory::App, &args, None)?,
        Commands::Functions(args) => {
            if args.only_package_json {
                commands::build::write_manifest(ctx, &args)?;
            } else {
                commands::build::run(
                    ctx,
                    TargetCategory::Functions,
                    &args.build,
                    args.firebase.as_deref(),
                )?;
            }
        }
        Commands::Lib(args) => commands::build::run(ctx, TargetCategory::Lib, &args, None)?,
        Commands::Build {
            target,
            args,
            firebase,
        } => {
            let category: TargetCategory = target.parse()?;
            commands::build::run(ctx, category, &args, firebase.as_deref())?;
        }
        Commands::Run(args) => return commands::run::run(ctx, &args),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Log to stderr, filtered by BUILD_TS_LOG or the verbosity flags
fn init_logging(cli_config: &config::Config, global: &GlobalArgs) {
    let default_level = config::Config::default_log_level(global.verbose, global.silent);
    let filter = cli_config
        .log_filter
        .as_deref()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli_config.no_color)
        .without_time()
        .init();
}
