//! Dispatch planning: which command runs on which files.
//!
//! Planning is pure. Every invocation and its trailing file list is fixed
//! here before any process starts, so execution can run rules in parallel
//! without sharing mutable state.

use crate::core::matcher::normalize_path;
use crate::core::rules::RuleSet;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One external process launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInvocation {
    /// Index of the owning rule in the rule set.
    pub rule_index: usize,
    /// Pattern of the owning rule.
    pub pattern: String,
    /// Command as written in the configuration.
    pub command: String,
    /// Executable to launch.
    pub program: String,
    /// Fixed arguments from the command template.
    pub args: Vec<String>,
    /// Matched files, sorted, appended after `args`.
    pub files: Vec<String>,
}

impl CommandInvocation {
    /// Full argument vector after the program: fixed args then files.
    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        self.args
            .iter()
            .chain(self.files.iter())
            .map(String::as_str)
            .collect()
    }

    /// The command as written followed by the shell-quoted files.
    ///
    /// This is what shell mode hands to `sh -c`, so pipes and variables in
    /// the configured command keep their meaning.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.files.is_empty() {
            return self.command.clone();
        }
        format!("{} {}", self.command, shell_words::join(&self.files))
    }
}

/// Everything one rule will run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulePlan {
    /// Index of the rule in the rule set.
    pub rule_index: usize,
    /// The rule's pattern.
    pub pattern: String,
    /// Files the pattern matched, sorted.
    pub files: Vec<String>,
    /// One invocation per command, in declared order.
    pub invocations: Vec<CommandInvocation>,
}

/// The complete dispatch decision for a file set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Rules with at least one matching file, in rule order.
    pub rules: Vec<RulePlan>,
    /// Files no rule matched, sorted.
    pub unmatched: Vec<String>,
}

impl Plan {
    /// Returns true when nothing would run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Total number of invocations across all rules.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.rules.iter().map(|r| r.invocations.len()).sum()
    }

    /// All invocations in rule order, then command order.
    pub fn invocations(&self) -> impl Iterator<Item = &CommandInvocation> {
        self.rules.iter().flat_map(|r| r.invocations.iter())
    }
}

/// How trailing file arguments are rendered.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// When set, files are passed as absolute paths under this root.
    pub absolute_root: Option<PathBuf>,
}

/// Partitions `files` by the rules that match them.
pub fn dispatch<I, S>(files: I, rules: &RuleSet) -> Plan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    dispatch_with(files, rules, &DispatchOptions::default())
}

/// Like [`dispatch`] with explicit rendering options.
pub fn dispatch_with<I, S>(files: I, rules: &RuleSet, options: &DispatchOptions) -> Plan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let files: BTreeSet<String> = files
        .into_iter()
        .map(|f| normalize_path(f.as_ref()))
        .filter(|f| !f.is_empty())
        .collect();

    let mut matched_any = BTreeSet::new();
    let mut plan = Plan::default();

    for (rule_index, rule) in rules.iter().enumerate() {
        let matched: Vec<&String> = files
            .iter()
            .filter(|f| rule.pattern().is_match(f))
            .collect();

        if matched.is_empty() {
            tracing::debug!(pattern = %rule.pattern(), "no files matched");
            continue;
        }

        matched_any.extend(matched.iter().map(|f| f.as_str()));

        let rendered: Vec<String> = matched
            .iter()
            .map(|f| render(f, options))
            .collect();

        tracing::debug!(
            pattern = %rule.pattern(),
            files = rendered.len(),
            commands = rule.commands().len(),
            "rule matched"
        );

        let invocations = rule
            .commands()
            .iter()
            .map(|command| CommandInvocation {
                rule_index,
                pattern: rule.pattern().as_str().to_string(),
                command: command.as_str().to_string(),
                program: command.program().to_string(),
                args: command.args().to_vec(),
                files: rendered.clone(),
            })
            .collect();

        plan.rules.push(RulePlan {
            rule_index,
            pattern: rule.pattern().as_str().to_string(),
            files: rendered,
            invocations,
        });
    }

    plan.unmatched = files
        .iter()
        .filter(|f| !matched_any.contains(f.as_str()))
        .cloned()
        .collect();

    plan
}

fn render(file: &str, options: &DispatchOptions) -> String {
    match options.absolute_root {
        Some(ref root) if !file.starts_with('/') => {
            normalize_path(&root.join(file).to_string_lossy())
        },
        _ => file.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::MatchOptions;
    use crate::core::rules::Rule;
    use pretty_assertions::assert_eq;

    fn rules(table: &[(&str, &[&str])]) -> RuleSet {
        table
            .iter()
            .map(|&(pattern, commands)| {
                Rule::parse(pattern, commands, MatchOptions::default()).expect("valid rule")
            })
            .collect()
    }

    fn lines(plan: &Plan) -> Vec<String> {
        plan.invocations().map(|i| i.command_line()).collect()
    }

    #[test]
    fn test_markdown_and_typescript_rules() {
        let rules = rules(&[("*.md", &["fmt-md"]), ("*.ts", &["fmt-ts", "lint-ts"])]);
        let plan = dispatch(["a.md", "b.ts", "c.txt"], &rules);

        assert_eq!(lines(&plan), ["fmt-md a.md", "fmt-ts b.ts", "lint-ts b.ts"]);
        assert_eq!(plan.unmatched, ["c.txt"]);
        assert_eq!(plan.invocation_count(), 3);
    }

    #[test]
    fn test_brace_expansion_at_any_depth() {
        let rules = rules(&[("**/*.{md,mdx}", &["fmt-md"])]);
        let plan = dispatch(["docs/readme.md", "docs/guide.mdx", "src/index.ts"], &rules);

        assert_eq!(plan.rules.len(), 1);
        assert_eq!(plan.rules[0].files, ["docs/guide.mdx", "docs/readme.md"]);
        assert_eq!(plan.unmatched, ["src/index.ts"]);
    }

    #[test]
    fn test_empty_file_set_plans_nothing() {
        let rules = rules(&[("*", &["anything"]), ("**/*", &["else"])]);
        let plan = dispatch(Vec::<String>::new(), &rules);
        assert!(plan.is_empty());
        assert_eq!(plan.invocation_count(), 0);
    }

    #[test]
    fn test_file_in_every_matching_rule() {
        let rules = rules(&[("*.ts", &["eslint"]), ("src/**", &["prettier"])]);
        let plan = dispatch(["src/a.ts"], &rules);

        assert_eq!(lines(&plan), ["eslint src/a.ts", "prettier src/a.ts"]);
        assert!(plan.unmatched.is_empty());
    }

    #[test]
    fn test_membership_iff_match() {
        let rules = rules(&[("src/*.{rs,toml}", &["check"]), ("*.md", &["fmt"])]);
        let files = [
            "src/lib.rs",
            "src/a/b.rs",
            "Cargo.toml",
            "src/Cargo.toml",
            "README.md",
            "docs/x.md",
        ];
        let plan = dispatch(files, &rules);

        for (index, rule) in rules.iter().enumerate() {
            let planned = plan
                .rules
                .iter()
                .find(|r| r.rule_index == index)
                .map(|r| r.files.clone())
                .unwrap_or_default();
            for file in files {
                assert_eq!(
                    planned.contains(&file.to_string()),
                    rule.pattern().is_match(file),
                    "{file} vs {}",
                    rule.pattern()
                );
            }
        }
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let rules = rules(&[("*.py", &["ruff check --fix", "ruff format"])]);
        let first = dispatch(["b.py", "a.py", "pkg/c.py"], &rules);
        let second = dispatch(["pkg/c.py", "a.py", "b.py"], &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn test_trailing_files_sorted_and_deduplicated() {
        let rules = rules(&[("*.md", &["fmt"])]);
        let plan = dispatch(["z.md", "./a.md", "a.md", "m\\n.md", ""], &rules);
        assert_eq!(plan.rules[0].files, ["a.md", "m/n.md", "z.md"]);
    }

    #[test]
    fn test_fixed_args_precede_files() {
        let rules = rules(&[("*.md", &["prettier --write --log-level warn"])]);
        let plan = dispatch(["a.md"], &rules);
        let invocation = plan.invocations().next().expect("one invocation");
        assert_eq!(invocation.program, "prettier");
        assert_eq!(invocation.argv(), ["--write", "--log-level", "warn", "a.md"]);
    }

    #[test]
    fn test_command_line_keeps_command_text() {
        let rules = rules(&[("*.md", &["echo $HOME | tr a-z A-Z"])]);
        let plan = dispatch(["a b.md", "c.md"], &rules);
        assert_eq!(lines(&plan), ["echo $HOME | tr a-z A-Z 'a b.md' c.md"]);
    }

    #[test]
    fn test_absolute_rendering() {
        let rules = rules(&[("*.md", &["fmt"])]);
        let options = DispatchOptions {
            absolute_root: Some(PathBuf::from("/repo")),
        };
        let plan = dispatch_with(["docs/a.md"], &rules, &options);
        assert_eq!(plan.rules[0].files, ["/repo/docs/a.md"]);
    }

    #[test]
    fn test_rule_order_is_preserved() {
        let rules = rules(&[("*.ts", &["second"]), ("*.md", &["first"])]);
        let plan = dispatch(["a.md", "b.ts"], &rules);
        let patterns: Vec<_> = plan.rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, ["*.ts", "*.md"]);
    }
}
