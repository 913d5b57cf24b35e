//! Starter rule sets for common project types.
//!
//! Presets seed `stagerun init --preset <name>` with a rules table that
//! can be edited afterwards.

use crate::config::{RuleEntry, RuleTable};

/// Available preset names.
pub mod names {
    /// Markdown documentation (markdownlint, prettier).
    pub const MARKDOWN: &str = "markdown";
    /// Node.js/TypeScript projects (eslint, prettier).
    pub const NODE: &str = "node";
    /// Python projects (ruff, pyright).
    pub const PYTHON: &str = "python";
    /// Rust projects (rustfmt).
    pub const RUST: &str = "rust";
    /// Obsidian plugin monorepos (prettier, markdownlint, ruff, pyright).
    pub const OBSIDIAN: &str = "obsidian";
}

/// Returns a list of available preset names.
#[must_use]
pub const fn available() -> &'static [&'static str] {
    &[
        names::MARKDOWN,
        names::NODE,
        names::PYTHON,
        names::RUST,
        names::OBSIDIAN,
    ]
}

/// Returns a description for a preset.
#[must_use]
pub fn description(name: &str) -> &'static str {
    match name {
        names::MARKDOWN => "Markdown docs (markdownlint --fix, prettier --write)",
        names::NODE => "Node.js/TypeScript projects (eslint --fix, prettier --write)",
        names::PYTHON => "Python projects (ruff check --fix, ruff format, pyright)",
        names::RUST => "Rust projects (rustfmt)",
        names::OBSIDIAN => "Obsidian plugin monorepo (prettier, markdownlint, ruff, pyright)",
        _ => "Unknown preset",
    }
}

/// Returns the rules table for a preset.
#[must_use]
pub fn rules(name: &str) -> Option<RuleTable> {
    let table = match name {
        names::MARKDOWN => vec![
            RuleEntry::new("**/*.{md,mdx}", ["markdownlint --fix", "prettier --write"]),
        ],
        names::NODE => vec![
            RuleEntry::new("**/*.{js,jsx,ts,tsx,mjs,cjs}", ["eslint --fix", "prettier --write"]),
            RuleEntry::new("**/*.{json,css,scss,yaml,yml}", ["prettier --write"]),
        ],
        names::PYTHON => vec![RuleEntry::new(
            "**/*.{py,pyi}",
            ["ruff check --fix", "ruff format", "pyright"],
        )],
        names::RUST => vec![RuleEntry::new("**/*.rs", ["rustfmt --edition 2021"])],
        names::OBSIDIAN => vec![
            RuleEntry::new(
                "**/*.{astro,cjs,css,csv,gql,graphql,hbs,htm,html,js,json,json5,jsonc,jsx,less,mjs,mts,cts,sass,scss,svelte,ts,tsx,vue,yaml,yml}",
                ["prettier --write"],
            ),
            RuleEntry::new("**/*.{md,markdown}", ["markdownlint --fix", "prettier --write"]),
            RuleEntry::new("**/*.{py,pyi}", ["ruff check --fix", "ruff format", "pyright"]),
        ],
        _ => return None,
    };

    Some(table.into_iter().collect())
}
