//! # stagerun
//!
//! Run linters and formatters on the files staged in git, dispatched by glob pattern.
//!
//! A project declares rules in `stagerun.toml`: each glob pattern maps to one
//! or more commands. `stagerun` matches the staged files against every
//! pattern and runs each matching rule's commands with the matched files
//! appended as trailing arguments.
//!
//! ## Features
//!
//! - **Glob dispatch**: `*`, `**`, `?`, character classes and `{a,b}` alternation
//! - **Multi-rule membership**: a file is handed to every rule that matches it
//! - **Concurrent rules**: independent rules run in parallel, commands within a rule in order
//! - **Git hook integration**: `stagerun install` wires it into `pre-commit`
//!
//! ## Example
//!
//! ```rust,no_run
//! use stagerun::{dispatch, Config, Runner};
//!
//! #[tokio::main]
//! async fn main() -> stagerun::Result<()> {
//!     let config = Config::load()?;
//!     let rules = config.rule_set()?;
//!
//!     let plan = dispatch(["docs/readme.md", "src/index.ts"], &rules);
//!
//!     let runner = Runner::new(config.run_options()?);
//!     let result = runner.run(&plan).await?;
//!
//!     std::process::exit(result.exit_code());
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/stagerun/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cli;
pub mod config;
pub mod core;
pub mod presets;

// Re-export main types for convenience
pub use config::Config;
pub use core::error::{Error, Result};
pub use core::matcher::Pattern;
pub use core::plan::{dispatch, dispatch_with, CommandInvocation, Plan};
pub use core::rules::{CommandTemplate, Rule, RuleSet};
pub use core::runner::{RunOptions, RunResult, Runner};
