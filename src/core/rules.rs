//! Compiled rules: glob patterns bound to command templates.

use crate::core::error::{Error, Result};
use crate::core::matcher::{MatchOptions, Pattern};

/// A command to run, split into program and fixed arguments.
///
/// Parsing follows POSIX shell word rules (quotes and backslashes are
/// honored) but nothing is expanded: no variables, globs or pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Parses a command line such as `prettier --write --log-level "warn"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut words = shell_words::split(raw).map_err(|e| Error::CommandParse {
            command: raw.to_string(),
            message: e.to_string(),
        })?;

        if words.is_empty() {
            return Err(Error::CommandParse {
                command: raw.to_string(),
                message: "command is empty".to_string(),
            });
        }

        let program = words.remove(0);
        Ok(Self {
            raw: raw.trim().to_string(),
            program,
            args: words,
        })
    }

    /// The command line as written in the configuration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Executable name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Fixed leading arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A glob pattern and the commands to run on files it matches.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Pattern,
    commands: Vec<CommandTemplate>,
}

impl Rule {
    /// Builds a rule, rejecting an empty command list.
    pub fn new(pattern: Pattern, commands: Vec<CommandTemplate>) -> Result<Self> {
        if commands.is_empty() {
            return Err(Error::config_invalid(
                format!("rules.\"{}\"", pattern.as_str()),
                "command list is empty",
            ));
        }
        Ok(Self { pattern, commands })
    }

    /// Compiles a rule from its configuration strings.
    pub fn parse<S: AsRef<str>>(
        pattern: &str,
        commands: &[S],
        options: MatchOptions,
    ) -> Result<Self> {
        let pattern = Pattern::with_options(pattern, options)?;
        let commands = commands
            .iter()
            .map(|c| CommandTemplate::parse(c.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(pattern, commands)
    }

    /// The compiled pattern.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Commands in execution order.
    #[must_use]
    pub fn commands(&self) -> &[CommandTemplate] {
        &self.commands
    }
}

/// Ordered rules. Order decides execution order, never shadowing.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Creates a rule set from rules in priority order.
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Iterates rules in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true when there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
