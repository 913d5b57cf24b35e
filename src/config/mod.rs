//! Configuration handling for stagerun.
//!
//! The configuration lives in `stagerun.toml`: a `[settings]` table for the
//! execution policy and a `[rules]` table mapping glob patterns to one
//! command or a list of commands. Rule order in the file is kept.

use crate::core::error::{Error, Result};
use crate::core::matcher::MatchOptions;
use crate::core::rules::{Rule, RuleSet};
use crate::core::runner::{concurrency, RunOptions};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "stagerun.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Execution settings.
    pub settings: Settings,
    /// Pattern-to-command rules, in priority order.
    pub rules: RuleTable,
}

impl Config {
    /// Loads configuration from the default location.
    pub fn load() -> Result<Self> {
        let path = Self::find_config_file()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Error::io("read config", e)
            }
        })?;

        tracing::debug!(path = %path.display(), "loading configuration");
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| {
                let message = e.to_string();
                Error::config_parse_with_source(message.trim_end(), e)
            })?;

        config.validate()?;

        Ok(config)
    }

    /// Finds the configuration file by searching up the directory tree.
    pub fn find_config_file() -> Result<PathBuf> {
        let cwd = std::env::current_dir().map_err(|e| Error::io("get current dir", e))?;
        Self::find_config_file_from(&cwd)
    }

    /// Finds the configuration file starting at `start`.
    pub fn find_config_file_from(start: &Path) -> Result<PathBuf> {
        let mut current = start;
        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                return Ok(config_path);
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(Error::ConfigNotFound {
            path: start.join(CONFIG_FILE_NAME),
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.settings.timeout_duration()?;

        if self.settings.concurrency == Some(0) {
            return Err(Error::config_invalid(
                "settings.concurrency",
                "must be at least 1",
            ));
        }

        let rules = self.rule_set()?;
        if rules.is_empty() {
            tracing::warn!("configuration has no rules, nothing will run");
        }

        Ok(())
    }

    /// Compiles the rules table.
    pub fn rule_set(&self) -> Result<RuleSet> {
        let options = self.settings.match_options();
        self.rules
            .iter()
            .map(|entry| {
                if entry.commands.is_empty() {
                    return Err(Error::config_invalid(
                        format!("rules.\"{}\"", entry.pattern),
                        "command list is empty",
                    ));
                }
                Rule::parse(&entry.pattern, entry.commands.as_slice(), options)
            })
            .collect()
    }

    /// Builds the execution policy described by the settings.
    pub fn run_options(&self) -> Result<RunOptions> {
        Ok(RunOptions {
            concurrent: self.settings.concurrent,
            concurrency: self
                .settings
                .concurrency
                .unwrap_or_else(concurrency::available_parallelism),
            fail_fast: self.settings.fail_fast,
            timeout: self.settings.timeout_duration()?,
            shell: self.settings.shell,
            ..RunOptions::default()
        })
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Internal {
            message: format!("Failed to serialize config: {e}"),
        })
    }

    /// Generates configuration for a specific preset.
    #[must_use]
    pub fn for_preset(preset: &str) -> Self {
        Self {
            settings: Settings::default(),
            rules: crate::presets::rules(preset).unwrap_or_default(),
        }
    }
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Run independent rules concurrently.
    pub concurrent: bool,
    /// Maximum rules running at once (default: CPU count).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// Stop starting commands after the first failure.
    pub fail_fast: bool,
    /// Per-command timeout, e.g. "2m".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Run commands through the platform shell.
    pub shell: bool,
    /// Pass absolute file paths instead of project-relative ones.
    pub absolute_paths: bool,
    /// Match patterns case-insensitively.
    pub case_insensitive: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrent: true,
            concurrency: None,
            fail_fast: false,
            timeout: None,
            shell: false,
            absolute_paths: false,
            case_insensitive: false,
        }
    }
}

impl Settings {
    /// Parses the timeout setting.
    pub fn timeout_duration(&self) -> Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|t| {
                humantime::parse_duration(t).map_err(|e| {
                    Error::config_invalid("settings.timeout", format!("Invalid duration '{t}': {e}"))
                })
            })
            .transpose()
    }

    /// Glob compilation options.
    #[must_use]
    pub const fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_insensitive: self.case_insensitive,
        }
    }
}

/// One `[rules]` entry as written in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// Glob pattern.
    pub pattern: String,
    /// Command strings, in order.
    pub commands: Vec<String>,
}

impl RuleEntry {
    /// Creates an entry.
    pub fn new<S: Into<String>>(pattern: impl Into<String>, commands: impl IntoIterator<Item = S>) -> Self {
        Self {
            pattern: pattern.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

/// The `[rules]` table with document order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable(pub Vec<RuleEntry>);

impl RuleTable {
    /// Iterates entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, RuleEntry> {
        self.0.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<RuleEntry> for RuleTable {
    fn from_iter<I: IntoIterator<Item = RuleEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A rule value: one command or several.
#[derive(Deserialize)]
#[serde(untagged)]
enum Commands {
    One(String),
    Many(Vec<String>),
}

impl Serialize for RuleTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            match entry.commands.as_slice() {
                [single] => map.serialize_entry(&entry.pattern, single)?,
                many => map.serialize_entry(&entry.pattern, many)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = RuleTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of glob patterns to a command or list of commands")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<RuleTable, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((pattern, commands)) = map.next_entry::<String, Commands>()? {
                    let commands = match commands {
                        Commands::One(command) => vec![command],
                        Commands::Many(commands) => commands,
                    };
                    entries.push(RuleEntry { pattern, commands });
                }
                Ok(RuleTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[settings]
fail_fast = true
concurrency = 2
timeout = "90s"

[rules]
"*.ts" = ["eslint --fix", "prettier --write"]
"**/*.{md,mdx}" = "markdownlint --fix"
"*.py" = ["ruff check --fix"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).expect("parse");

        assert!(config.settings.fail_fast);
        assert_eq!(config.settings.concurrency, Some(2));
        assert_eq!(
            config.settings.timeout_duration().expect("timeout"),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            config.rules,
            RuleTable(vec![
                RuleEntry::new("*.ts", ["eslint --fix", "prettier --write"]),
                RuleEntry::new("**/*.{md,mdx}", ["markdownlint --fix"]),
                RuleEntry::new("*.py", ["ruff check --fix"]),
            ])
        );
    }

    #[test]
    fn test_rule_order_follows_document() {
        let config = Config::from_toml_str(
            r#"
[rules]
"z" = "one"
"a" = "two"
"m" = "three"
"#,
        )
        .expect("parse");
        let patterns: Vec<_> = config.rules.iter().map(|e| e.pattern.as_str()).collect();
        assert_eq!(patterns, ["z", "a", "m"]);
    }

    #[test]
    fn test_default_settings() {
        let config = Config::from_toml_str("[rules]\n\"*.md\" = \"fmt\"\n").expect("parse");
        assert!(config.settings.concurrent);
        assert!(!config.settings.fail_fast);
        assert!(!config.settings.shell);
        assert_eq!(config.settings.timeout_duration().expect("timeout"), None);
    }

    #[test]
    fn test_empty_command_list_rejected() {
        let err = Config::from_toml_str("[rules]\n\"*.md\" = []\n").expect_err("should fail");
        assert!(matches!(err, Error::ConfigInvalid { ref field, .. } if field == "rules.\"*.md\""));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = Config::from_toml_str("[rules]\n\"\" = \"fmt\"\n").expect_err("should fail");
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let err = Config::from_toml_str("[rules]\n\"*.{md\" = \"fmt\"\n").expect_err("should fail");
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "*.{md"));
    }

    #[test]
    fn test_blank_command_rejected() {
        let err = Config::from_toml_str("[rules]\n\"*.md\" = [\"fmt\", \"  \"]\n")
            .expect_err("should fail");
        assert!(matches!(err, Error::CommandParse { .. }));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = Config::from_toml_str("[settings]\ntimeout = \"soon\"\n").expect_err("should fail");
        assert!(matches!(err, Error::ConfigInvalid { ref field, .. } if field == "settings.timeout"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err =
            Config::from_toml_str("[settings]\nconcurrency = 0\n").expect_err("should fail");
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml_str("[rules\n").expect_err("should fail");
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.to_string().contains("line 1"), "{err}");
    }

    #[test]
    fn test_wrong_value_type() {
        let err = Config::from_toml_str("[rules]\n\"*.md\" = 3\n").expect_err("should fail");
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.to_string().contains("*.md"), "{err}");
    }

    #[test]
    fn test_unknown_setting_rejected() {
        let err =
            Config::from_toml_str("[settings]\nfailfast = true\n").expect_err("should fail");
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.to_string().contains("failfast"), "{err}");
    }

    #[test]
    fn test_toml_round_trip_keeps_order() {
        let config = Config::from_toml_str(SAMPLE).expect("parse");
        let text = config.to_toml().expect("serialize");
        let reparsed = Config::from_toml_str(&text).expect("reparse");
        assert_eq!(reparsed.rules, config.rules);
        assert!(text.contains("[rules]"));
        assert!(text.contains("\"**/*.{md,mdx}\" = \"markdownlint --fix\""));
    }

    #[test]
    fn test_run_options_from_settings() {
        let config = Config::from_toml_str(SAMPLE).expect("parse");
        let options = config.run_options().expect("options");
        assert!(options.fail_fast);
        assert_eq!(options.concurrency, 2);
        assert_eq!(options.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = tempfile::tempdir().expect("temp dir");
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "").expect("write config");
        let nested = temp.path().join("packages/app");
        std::fs::create_dir_all(&nested).expect("create dirs");

        let found = Config::find_config_file_from(&nested).expect("find");
        assert_eq!(found, temp.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_load_from_missing_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let err = Config::load_from(&temp.path().join(CONFIG_FILE_NAME)).expect_err("missing");
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_preset_config_is_valid() {
        for preset in crate::presets::available() {
            let config = Config::for_preset(preset);
            assert!(!config.rules.is_empty(), "{preset}");
            assert!(config.validate().is_ok(), "{preset}");
        }
    }
}
