//! CLI command implementations.

use super::RunArgs;
use crate::config::{Config, CONFIG_FILE_NAME};
use crate::core::error::{Error, Result};
use crate::core::executor::Executor;
use crate::core::git::{split_nul, GitRepo};
use crate::core::matcher::normalize_path;
use crate::core::plan::{dispatch_with, DispatchOptions, Plan};
use crate::core::runner::{RunResult, Runner};
use console::style;
use serde::Serialize;
use std::io::{IsTerminal, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;

/// Hook script template.
const HOOK_SCRIPT: &str = r#"#!/bin/sh
# stagerun hook - installed by `stagerun install`

# Skip if STAGERUN_SKIP is set
if [ "$STAGERUN_SKIP" = "1" ]; then
    exit 0
fi

exec stagerun run
"#;

/// Hook marker comment.
const HOOK_MARKER: &str = "# stagerun hook";

/// Output verbosity shared by all commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    /// Print command output for passing commands too.
    pub verbose: bool,
    /// Only print errors.
    pub quiet: bool,
}

/// Loads the configuration and returns it with the project root.
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::find_config_file()?,
    };
    let config = Config::load_from(&path)?;

    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let root = root
        .canonicalize()
        .map_err(|e| Error::io(format!("resolve {}", root.display()), e))?;

    Ok((config, root))
}

/// Initialize configuration.
pub fn init(preset: Option<&str>, force: bool, path: Option<&Path>) -> Result<ExitCode> {
    let config_path = path.map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), Path::to_path_buf);

    if config_path.exists() && !force {
        eprintln!(
            "{} Configuration already exists: {}",
            style("!").yellow(),
            config_path.display()
        );
        eprintln!("  Use --force to overwrite.");
        return Ok(ExitCode::FAILURE);
    }

    let config = match preset {
        Some(p) => Config::for_preset(p),
        None => Config::for_preset(crate::presets::names::MARKDOWN),
    };

    std::fs::write(&config_path, config.to_toml()?).map_err(|e| Error::io("write config", e))?;

    eprintln!("{} Created {}", style("✓").green(), config_path.display());

    if let Some(p) = preset {
        eprintln!("  Using preset: {p} - {}", crate::presets::description(p));
    }

    eprintln!("\nNext steps:");
    eprintln!("  1. Review the [rules] in {}", config_path.display());
    eprintln!("  2. Run: stagerun install");

    Ok(ExitCode::SUCCESS)
}

/// Install git hook.
pub fn install(force: bool) -> Result<ExitCode> {
    let repo = GitRepo::discover()?;
    let hooks_dir = repo.hooks_dir();
    let hook_path = hooks_dir.join("pre-commit");

    if !hooks_dir.exists() {
        std::fs::create_dir_all(&hooks_dir).map_err(|e| Error::io("create hooks dir", e))?;
    }

    if hook_path.exists() {
        let content =
            std::fs::read_to_string(&hook_path).map_err(|e| Error::io("read existing hook", e))?;

        if content.contains(HOOK_MARKER) {
            eprintln!(
                "{} Hook already installed at {}",
                style("✓").green(),
                hook_path.display()
            );
            return Ok(ExitCode::SUCCESS);
        }

        if !force && !confirm_overwrite(&hook_path)? {
            return Err(Error::HookExists { path: hook_path });
        }

        let backup_path = hooks_dir.join("pre-commit.bak");
        std::fs::rename(&hook_path, &backup_path).map_err(|e| Error::io("backup hook", e))?;
        eprintln!(
            "{} Backed up existing hook to {}",
            style("•").cyan(),
            backup_path.display()
        );
    }

    std::fs::write(&hook_path, HOOK_SCRIPT).map_err(|e| Error::io("write hook", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&hook_path)
            .map_err(|e| Error::io("get hook metadata", e))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&hook_path, perms).map_err(|e| Error::io("set hook perms", e))?;
    }

    eprintln!(
        "{} Installed pre-commit hook at {}",
        style("✓").green(),
        hook_path.display()
    );

    Ok(ExitCode::SUCCESS)
}

/// Asks before replacing a hook we did not write. Never asks without a terminal.
fn confirm_overwrite(hook_path: &Path) -> Result<bool> {
    if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
        return Ok(false);
    }

    dialoguer::Confirm::new()
        .with_prompt(format!(
            "A pre-commit hook already exists at {}. Replace it (a backup is kept)?",
            hook_path.display()
        ))
        .default(false)
        .interact()
        .map_err(|e| Error::HookInstall {
            message: e.to_string(),
        })
}

/// Uninstall git hook.
pub fn uninstall() -> Result<ExitCode> {
    let repo = GitRepo::discover()?;
    let hook_path = repo.hook_path("pre-commit");

    if !hook_path.exists() {
        eprintln!(
            "{} No hook installed at {}",
            style("•").cyan(),
            hook_path.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let content = std::fs::read_to_string(&hook_path).map_err(|e| Error::io("read hook", e))?;

    if !content.contains(HOOK_MARKER) {
        eprintln!(
            "{} Hook at {} was not installed by stagerun",
            style("!").yellow(),
            hook_path.display()
        );
        eprintln!("  Remove manually if desired.");
        return Ok(ExitCode::FAILURE);
    }

    std::fs::remove_file(&hook_path).map_err(|e| Error::io("remove hook", e))?;

    eprintln!(
        "{} Removed pre-commit hook from {}",
        style("✓").green(),
        hook_path.display()
    );

    let backup_path = repo.hooks_dir().join("pre-commit.bak");
    if backup_path.exists() {
        eprintln!(
            "  Backup exists at {} - restore if needed",
            backup_path.display()
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Dispatch files to the configured commands.
pub fn run(args: &RunArgs, config_path: Option<&Path>, output: Output) -> Result<ExitCode> {
    if std::env::var("STAGERUN_SKIP").ok().as_deref() == Some("1") {
        if !output.quiet {
            eprintln!("{} Skipping (STAGERUN_SKIP=1)", style("•").cyan());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let (config, root) = load_config(config_path)?;
    let rules = config.rule_set()?;

    let files = collect_files(args, &root)?;
    tracing::debug!(count = files.len(), root = %root.display(), "collected files");

    let options = DispatchOptions {
        absolute_root: config.settings.absolute_paths.then(|| root.clone()),
    };
    let plan = dispatch_with(&files, &rules, &options);

    if args.dry_run {
        print_plan(&plan, args.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    if plan.is_empty() {
        if args.json {
            print_json(&Report::new(&RunResult::default()))?;
        } else if !output.quiet {
            eprintln!("{} No files matched any pattern", style("•").cyan());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut run_options = config.run_options()?;
    run_options.fail_fast |= args.fail_fast;
    if args.sequential {
        run_options.concurrent = false;
    }
    if let Some(n) = args.concurrency {
        run_options.concurrency = usize::from(n);
    }
    run_options.cwd = Some(root);
    run_options.report = !output.quiet && !args.json;
    run_options.show_output = output.verbose;

    let runner = Runner::new(run_options);

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Internal {
            message: format!("Failed to create runtime: {e}"),
        })?
        .block_on(runner.run(&plan))?;

    if args.json {
        print_json(&Report::new(&result))?;
    } else {
        print_summary(&result, output);
    }

    Ok(exit_code(result.exit_code()))
}

/// Gathers the input files, relative to the project root.
fn collect_files(args: &RunArgs, root: &Path) -> Result<Vec<String>> {
    let cwd = std::env::current_dir().map_err(|e| Error::io("get current dir", e))?;

    if !args.files.is_empty() {
        return Ok(rebase(args.files.iter(), &cwd, root));
    }

    if args.stdin {
        let mut input = Vec::new();
        std::io::stdin()
            .read_to_end(&mut input)
            .map_err(|e| Error::io("read stdin", e))?;
        return Ok(rebase(parse_file_list(&input).iter(), &cwd, root));
    }

    let repo = GitRepo::discover_from(root);

    if args.all {
        return match repo {
            Ok(repo) => Ok(rebase(repo.tracked_files()?.iter(), repo.root(), root)),
            Err(Error::NotGitRepo) => Ok(walk_files(root)),
            Err(e) => Err(e),
        };
    }

    let repo = repo?;
    Ok(rebase(repo.staged_files()?.iter(), repo.root(), root))
}

/// Splits a file list that is NUL separated if it contains NUL, else newline separated.
fn parse_file_list(input: &[u8]) -> Vec<String> {
    if input.contains(&0) {
        return split_nul(input);
    }
    String::from_utf8_lossy(input)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Re-expresses paths relative to `base` as paths relative to `root`.
///
/// Paths outside `root` are dropped: they cannot belong to this project.
fn rebase<'a>(files: impl Iterator<Item = &'a String>, base: &Path, root: &Path) -> Vec<String> {
    let base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());

    files
        .filter_map(|file| {
            let absolute = resolve_parent_dirs(&base.join(file));
            match absolute.strip_prefix(root) {
                Ok(relative) => Some(normalize_path(&relative.to_string_lossy())),
                Err(_) => {
                    tracing::warn!(file = %file, root = %root.display(), "ignoring file outside the project");
                    None
                },
            }
        })
        .collect()
}

/// Removes `.` and `..` components without touching the file system.
fn resolve_parent_dirs(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                resolved.pop();
            },
            other => resolved.push(other),
        }
    }
    resolved
}

/// Lists every file under `root`, skipping `.git`.
fn walk_files(root: &Path) -> Vec<String> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable path");
                None
            },
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|p| normalize_path(&p.to_string_lossy()))
        })
        .collect()
}

/// Prints the plan without running it.
fn print_plan(plan: &Plan, json: bool) -> Result<()> {
    if json {
        return print_json(plan);
    }

    if plan.is_empty() {
        eprintln!("{} No files matched any pattern", style("•").cyan());
    }

    let mut stdout = std::io::stdout().lock();
    for rule in &plan.rules {
        writeln!(stdout, "{} ({} files)", rule.pattern, rule.files.len())
            .map_err(|e| Error::io("write output", e))?;
        for invocation in &rule.invocations {
            writeln!(stdout, "  {}", invocation.command_line())
                .map_err(|e| Error::io("write output", e))?;
        }
    }
    Ok(())
}

/// Run report emitted with `--json`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    success: bool,
    exit_code: i32,
    passed: usize,
    failed: usize,
    skipped: usize,
    #[serde(flatten)]
    result: &'a RunResult,
}

impl<'a> Report<'a> {
    fn new(result: &'a RunResult) -> Self {
        Self {
            success: result.success(),
            exit_code: result.exit_code(),
            passed: result.passed_count(),
            failed: result.failed_count(),
            skipped: result.skipped_count(),
            result,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Internal {
        message: format!("Failed to serialize JSON: {e}"),
    })?;
    writeln!(std::io::stdout(), "{text}").map_err(|e| Error::io("write output", e))
}

/// Prints the end-of-run summary with every failure in full.
fn print_summary(result: &RunResult, output: Output) {
    if result.success() {
        if !output.quiet {
            eprintln!(
                "{} {} command(s) passed in {}",
                style("✓").green().bold(),
                result.passed_count(),
                humantime::format_duration(round_millis(result.duration))
            );
        }
        return;
    }

    eprintln!();
    eprintln!(
        "{} {} command(s) failed ({} passed, {} skipped)",
        style("✗").red().bold(),
        result.failed_count(),
        result.passed_count(),
        result.skipped_count()
    );

    for failure in result.failures() {
        let invocation = &failure.invocation;
        eprintln!();
        eprintln!(
            "  {} {} (exit {})",
            style("Failed:").red(),
            invocation.command_line(),
            failure.output.exit_code
        );
        eprintln!("  {} {}", style("Pattern:").dim(), invocation.pattern);
        eprintln!("  {} {}", style("Files:").dim(), invocation.files.join(", "));
        let combined = failure.output.combined_output();
        for line in combined.lines() {
            eprintln!("    {line}");
        }
    }
}

fn round_millis(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Maps an exit status to a process exit code.
pub fn exit_code(code: i32) -> ExitCode {
    match code {
        0 => ExitCode::SUCCESS,
        code => ExitCode::from(u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)),
    }
}

/// List configured rules.
pub fn list(path: Option<&Path>) -> Result<ExitCode> {
    let (config, root) = load_config(path)?;

    eprintln!("{} {}", style("Project root:").bold(), root.display());
    if config.rules.is_empty() {
        eprintln!("  (no rules)");
    }

    for rule in &config.rule_set()? {
        eprintln!("  {}", style(rule.pattern()).cyan());
        for command in rule.commands() {
            if Executor::command_exists(command.program()) {
                eprintln!("    → {command}");
            } else {
                eprintln!(
                    "    → {command} {}",
                    style(format!("({} not found)", command.program())).yellow()
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Validate configuration.
pub fn validate(path: Option<&Path>) -> Result<ExitCode> {
    let loaded = match path {
        Some(p) => Config::load_from(p),
        None => Config::load(),
    };

    match loaded {
        Ok(config) => {
            eprintln!(
                "{} Configuration is valid ({} rule(s))",
                style("✓").green(),
                config.rules.len()
            );
            Ok(ExitCode::SUCCESS)
        },
        Err(Error::ConfigNotFound { path }) => {
            eprintln!(
                "{} Configuration not found: {}",
                style("!").yellow(),
                path.display()
            );
            eprintln!("  Run: stagerun init");
            Ok(ExitCode::FAILURE)
        },
        Err(e) => {
            eprintln!("{} Configuration validation failed: {e}", style("✗").red());
            Ok(ExitCode::FAILURE)
        },
    }
}

/// Show configuration.
pub fn config(raw: bool, path: Option<&Path>) -> Result<ExitCode> {
    let found = match path {
        Some(p) if p.is_file() => Ok(p.to_path_buf()),
        Some(p) => Err(Error::ConfigNotFound {
            path: p.to_path_buf(),
        }),
        None => Config::find_config_file(),
    };

    match found {
        Ok(path) => {
            eprintln!("Configuration file: {}", path.display());

            if raw {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| Error::io("read config", e))?;
                eprintln!();
                std::io::stdout()
                    .write_all(content.as_bytes())
                    .map_err(|e| Error::io("write output", e))?;
            }

            Ok(ExitCode::SUCCESS)
        },
        Err(Error::ConfigNotFound { .. }) => {
            eprintln!("{} No configuration file found", style("!").yellow());
            eprintln!("  Run: stagerun init");
            Ok(ExitCode::FAILURE)
        },
        Err(e) => Err(e),
    }
}

/// Generate shell completions.
pub fn completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(
        shell,
        &mut super::Cli::command(),
        "stagerun",
        &mut std::io::stdout(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_file_list_newlines() {
        assert_eq!(
            parse_file_list(b"a.md\n  src/b.ts \n\n"),
            ["a.md", "src/b.ts"]
        );
    }

    #[test]
    fn test_parse_file_list_nul() {
        assert_eq!(parse_file_list(b"a b.md\0c.ts\0"), ["a b.md", "c.ts"]);
    }

    #[test]
    fn test_rebase_into_subproject() {
        let temp = tempfile::tempdir().expect("temp dir");
        let base = temp.path().canonicalize().expect("canonicalize");
        let root = base.join("packages/app");
        std::fs::create_dir_all(&root).expect("create dirs");

        let files = vec![
            "packages/app/src/a.ts".to_string(),
            "packages/other/b.ts".to_string(),
            "README.md".to_string(),
        ];
        assert_eq!(rebase(files.iter(), &base, &root), ["src/a.ts"]);
    }

    #[test]
    fn test_rebase_drops_parent_escapes() {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = temp.path().canonicalize().expect("canonicalize");

        let files = vec![
            "../outside.md".to_string(),
            "docs/../../outside.md".to_string(),
            "docs/../a.md".to_string(),
            "./b.md".to_string(),
        ];
        assert_eq!(rebase(files.iter(), &root, &root), ["a.md", "b.md"]);
    }

    #[test]
    fn test_walk_files_skips_git_dir() {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = temp.path();
        std::fs::create_dir_all(root.join(".git/objects")).expect("create dirs");
        std::fs::create_dir_all(root.join("docs")).expect("create dirs");
        std::fs::write(root.join(".git/HEAD"), "ref").expect("write");
        std::fs::write(root.join("docs/a.md"), "# a").expect("write");
        std::fs::write(root.join("b.ts"), "").expect("write");

        let mut files = walk_files(root);
        files.sort();
        assert_eq!(files, ["b.ts", "docs/a.md"]);
    }

    #[test]
    fn test_exit_code_mapping() {
        let same = |a: ExitCode, b: ExitCode| format!("{a:?}") == format!("{b:?}");
        assert!(same(exit_code(0), ExitCode::SUCCESS));
        assert!(same(exit_code(3), ExitCode::from(3)));
        assert!(same(exit_code(256), ExitCode::from(1)));
        assert!(same(exit_code(-1), ExitCode::from(1)));
    }

    #[test]
    fn test_report_serializes_counts() {
        let result = RunResult::default();
        let json = serde_json::to_value(Report::new(&result)).expect("serialize");
        assert_eq!(json["success"], true);
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["invocations"], serde_json::json!([]));
    }
}
