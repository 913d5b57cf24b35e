//! Core functionality for stagerun.
//!
//! This module contains the main components:
//! - [`matcher`]: Glob patterns and path normalization
//! - [`rules`]: Rules and command templates
//! - [`plan`]: Pure dispatch of files to command invocations
//! - [`runner`]: Plan execution engine
//! - [`executor`]: Process spawning
//! - [`error`]: Error types and result handling
//! - [`git`]: Git repository operations

pub mod error;
pub mod executor;
pub mod git;
pub mod matcher;
pub mod plan;
pub mod rules;
pub mod runner;
