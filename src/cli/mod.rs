//! Command-line interface for stagerun.
//!
//! This module provides the `stagerun` CLI with subcommands for:
//! - `run`: Dispatch files to the configured commands (default)
//! - `init`: Create a configuration file
//! - `install` / `uninstall`: Manage the git pre-commit hook
//! - `list`: Show configured rules
//! - `validate`: Validate configuration
//! - `config`: Show configuration file location and contents

mod commands;

use crate::core::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Run linters and formatters on staged files, dispatched by glob pattern.
#[derive(Debug, Parser)]
#[command(
    name = "stagerun",
    author,
    version,
    about = "Run linters and formatters on staged files, dispatched by glob pattern",
    long_about = r#"
stagerun matches files (staged in git by default) against the glob patterns
in stagerun.toml and runs each pattern's commands with the matching files
appended as arguments.

Quick start:
  stagerun init --preset node   # Create stagerun.toml
  stagerun install              # Install git pre-commit hook
  # Done! Commits now run your tools on staged files.

Environment variables:
  STAGERUN_SKIP=1          Skip all commands
  STAGERUN_CONFIG=<path>   Use a specific configuration file
"#,
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "STAGERUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use color output.
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,
}

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Always use color.
    Always,
    /// Auto-detect color support.
    #[default]
    Auto,
    /// Never use color.
    Never,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the configured commands on matching files.
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Create a stagerun.toml configuration.
    #[command(visible_alias = "i")]
    Init {
        /// Use a preset rule set.
        #[arg(short, long, value_parser = ["markdown", "node", "python", "rust", "obsidian"])]
        preset: Option<String>,

        /// Overwrite existing configuration.
        #[arg(short, long)]
        force: bool,
    },

    /// Install the git pre-commit hook.
    Install {
        /// Overwrite an existing hook (a backup is kept).
        #[arg(short, long)]
        force: bool,
    },

    /// Remove the git pre-commit hook.
    Uninstall,

    /// List configured rules.
    #[command(visible_alias = "l")]
    List,

    /// Validate the configuration file.
    #[command(visible_alias = "v")]
    Validate,

    /// Show configuration file location and contents.
    Config {
        /// Output raw TOML.
        #[arg(long)]
        raw: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Arguments for `stagerun run`.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Files to dispatch instead of the staged files.
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Read files from stdin (newline or NUL separated).
    #[arg(long, conflicts_with_all = ["files", "all"])]
    pub stdin: bool,

    /// Dispatch every tracked file instead of the staged files.
    #[arg(long, conflicts_with = "files")]
    pub all: bool,

    /// Stop starting commands after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// Run rules one at a time.
    #[arg(long, conflicts_with = "concurrency")]
    pub sequential: bool,

    /// Maximum number of rules running at once.
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Show what would run without running anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the plan or report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Runs the CLI.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);
    setup_color(cli.color);

    let config = cli.config.as_deref();
    let output = commands::Output {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    // If no subcommand, run the default action (same as `stagerun run`)
    match cli.command {
        Some(Commands::Run(args)) => commands::run(&args, config, output),
        Some(Commands::Init { preset, force }) => commands::init(preset.as_deref(), force, config),
        Some(Commands::Install { force }) => commands::install(force),
        Some(Commands::Uninstall) => commands::uninstall(),
        Some(Commands::List) => commands::list(config),
        Some(Commands::Validate) => commands::validate(config),
        Some(Commands::Config { raw }) => commands::config(raw, config),
        Some(Commands::Completions { shell }) => {
            commands::completions(shell);
            Ok(ExitCode::SUCCESS)
        },
        None => commands::run(&RunArgs::default(), config, output),
    }
}

/// Sets up logging based on verbosity flags.
fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Sets up color output.
fn setup_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        },
        ColorChoice::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        },
        ColorChoice::Auto => {
            // Let console crate auto-detect
        },
    }
}
