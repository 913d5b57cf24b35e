//! Plan execution.
//!
//! Rules run concurrently up to a slot limit; the commands inside one rule
//! run in declared order. Failures are collected rather than raised so the
//! caller gets one report covering every invocation.

use crate::core::error::{Error, Result};
use crate::core::executor::{CommandOutput, CommandSpec, ExecuteOptions, Executor};
use crate::core::plan::{CommandInvocation, Plan, RulePlan};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Exit code recorded when a program cannot be found.
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

/// Outcome of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    /// Exited with code 0.
    Passed,
    /// Exited non-zero, timed out or could not be spawned.
    Failed,
    /// Never started.
    Skipped,
}

/// Result of running a single invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    /// What was (or would have been) run.
    pub invocation: CommandInvocation,
    /// How it ended.
    pub status: InvocationStatus,
    /// Captured output.
    pub output: CommandOutput,
    /// Reason for skipping (if skipped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl InvocationResult {
    fn skipped(invocation: CommandInvocation, reason: impl Into<String>) -> Self {
        Self {
            invocation,
            status: InvocationStatus::Skipped,
            output: CommandOutput::default(),
            skip_reason: Some(reason.into()),
        }
    }

    fn spawn_failed(invocation: CommandInvocation, error: &Error, duration: Duration) -> Self {
        let exit_code = match error {
            Error::CommandNotFound { .. } => NOT_FOUND_EXIT_CODE,
            _ => 1,
        };
        Self {
            invocation,
            status: InvocationStatus::Failed,
            output: CommandOutput {
                exit_code,
                stderr: error.to_string(),
                duration,
                ..CommandOutput::default()
            },
            skip_reason: None,
        }
    }

    /// Returns true if the invocation failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.status == InvocationStatus::Failed
    }
}

/// Result of running a whole plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    /// Results in plan order.
    pub invocations: Vec<InvocationResult>,
    /// Total duration.
    pub duration: Duration,
}

impl RunResult {
    /// Returns true if no invocation failed.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.invocations.iter().any(InvocationResult::failed)
    }

    /// Returns the number of passed invocations.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(InvocationStatus::Passed)
    }

    /// Returns the number of failed invocations.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(InvocationStatus::Failed)
    }

    /// Returns the number of skipped invocations.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(InvocationStatus::Skipped)
    }

    /// Returns failed invocation results.
    pub fn failures(&self) -> impl Iterator<Item = &InvocationResult> {
        self.invocations.iter().filter(|r| r.failed())
    }

    /// Exit code of the first failure in plan order, or 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.failures()
            .next()
            .map_or(0, |r| match r.output.exit_code {
                0 => 1,
                code => code,
            })
    }

    fn count(&self, status: InvocationStatus) -> usize {
        self.invocations.iter().filter(|r| r.status == status).count()
    }
}

/// Execution policy.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run independent rules at the same time.
    pub concurrent: bool,
    /// Maximum number of rules running at once.
    pub concurrency: usize,
    /// Stop starting new invocations after the first failure.
    pub fail_fast: bool,
    /// Per-invocation timeout.
    pub timeout: Option<Duration>,
    /// Run command lines through the platform shell.
    pub shell: bool,
    /// Working directory for every invocation.
    pub cwd: Option<PathBuf>,
    /// Print per-rule progress to stderr.
    pub report: bool,
    /// Also print output of passing commands.
    pub show_output: bool,
    /// Abort on Ctrl-C.
    pub interruptible: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrent: true,
            concurrency: concurrency::available_parallelism(),
            fail_fast: false,
            timeout: None,
            shell: false,
            cwd: None,
            report: false,
            show_output: false,
            interruptible: true,
        }
    }
}

/// Runner for executing a dispatch plan.
#[derive(Debug, Clone)]
pub struct Runner {
    options: RunOptions,
    executor: Executor,
}

impl Runner {
    /// Creates a new runner.
    #[must_use]
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            executor: Executor::new(),
        }
    }

    /// Returns the execution policy.
    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs every invocation in the plan.
    pub async fn run(&self, plan: &Plan) -> Result<RunResult> {
        let start = Instant::now();

        if plan.is_empty() {
            return Ok(RunResult {
                invocations: Vec::new(),
                duration: start.elapsed(),
            });
        }

        let reporter = Reporter::new(self.options.report, plan.invocation_count());

        let invocations = if self.options.interruptible {
            tokio::select! {
                results = self.run_rules(plan, &reporter) => results?,
                Ok(()) = tokio::signal::ctrl_c() => {
                    reporter.finish();
                    tracing::warn!("interrupted, terminating running commands");
                    return Err(Error::Interrupted);
                },
            }
        } else {
            self.run_rules(plan, &reporter).await?
        };

        reporter.finish();

        Ok(RunResult {
            invocations,
            duration: start.elapsed(),
        })
    }

    async fn run_rules(&self, plan: &Plan, reporter: &Reporter) -> Result<Vec<InvocationResult>> {
        let context = Arc::new(Context {
            executor: self.executor,
            options: self.options.clone(),
            failed: AtomicBool::new(false),
            reporter: reporter.clone(),
        });

        if !self.options.concurrent || plan.rules.len() == 1 {
            let mut results = Vec::with_capacity(plan.invocation_count());
            for rule in &plan.rules {
                results.extend(run_rule(rule.clone(), &context).await);
            }
            return Ok(results);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        // Dropping the set aborts every task, and with it every child process.
        let mut tasks = JoinSet::new();

        for (position, rule) in plan.rules.iter().cloned().enumerate() {
            let sem = Arc::clone(&semaphore);
            let context = Arc::clone(&context);

            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.map_err(|_| Error::Internal {
                    message: "Semaphore closed unexpectedly".to_string(),
                })?;
                Ok::<_, Error>((position, run_rule(rule, &context).await))
            });
        }

        let mut grouped = Vec::with_capacity(plan.rules.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => grouped.push(result?),
                Err(e) => {
                    return Err(Error::Internal {
                        message: format!("Task join error: {e}"),
                    });
                },
            }
        }

        grouped.sort_by_key(|(position, _)| *position);
        Ok(grouped.into_iter().flat_map(|(_, results)| results).collect())
    }
}

/// State shared by all rule tasks of one run.
struct Context {
    executor: Executor,
    options: RunOptions,
    failed: AtomicBool,
    reporter: Reporter,
}

/// Runs one rule's commands in order, skipping the rest after a failure.
async fn run_rule(rule: RulePlan, context: &Context) -> Vec<InvocationResult> {
    let mut results = Vec::with_capacity(rule.invocations.len());
    let mut rule_failed = false;

    for invocation in rule.invocations {
        if rule_failed {
            results.push(InvocationResult::skipped(
                invocation,
                "an earlier command for this pattern failed",
            ));
            continue;
        }

        if context.options.fail_fast && context.failed.load(Ordering::SeqCst) {
            results.push(InvocationResult::skipped(
                invocation,
                "fail-fast: another command failed",
            ));
            continue;
        }

        let result = run_invocation(invocation, context).await;
        if result.failed() {
            rule_failed = true;
            context.failed.store(true, Ordering::SeqCst);
        }
        results.push(result);
    }

    context.reporter.rule_finished(&rule.pattern, &rule.files, &results, context.options.show_output);
    results
}

async fn run_invocation(invocation: CommandInvocation, context: &Context) -> InvocationResult {
    let start = Instant::now();
    let spec = CommandSpec::for_invocation(&invocation, context.options.shell);

    let mut options = ExecuteOptions::default().timeout(context.options.timeout);
    if let Some(ref cwd) = context.options.cwd {
        options = options.cwd(cwd);
    }

    tracing::debug!(
        pattern = %invocation.pattern,
        command = %invocation.command,
        files = invocation.files.len(),
        "running"
    );

    match context.executor.execute(&spec, &options).await {
        Ok(output) => {
            let status = if output.success() {
                InvocationStatus::Passed
            } else {
                InvocationStatus::Failed
            };
            InvocationResult {
                invocation,
                status,
                output,
                skip_reason: None,
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, command = %invocation.command, "spawn failed");
            InvocationResult::spawn_failed(invocation, &e, start.elapsed())
        },
    }
}

/// Progress output, grouped per rule.
#[derive(Clone)]
struct Reporter {
    enabled: bool,
    spinner: Option<ProgressBar>,
}

impl Reporter {
    fn new(enabled: bool, total: usize) -> Self {
        let spinner = (enabled && console::Term::stderr().is_term()).then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .ok()
                    .unwrap_or_else(ProgressStyle::default_spinner),
            );
            pb.set_message(format!("Running {total} command(s)..."));
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        Self { enabled, spinner }
    }

    fn line(&self, message: &str) {
        match self.spinner {
            Some(ref pb) => pb.println(message),
            None => eprintln!("{message}"),
        }
    }

    fn rule_finished(
        &self,
        pattern: &str,
        files: &[String],
        results: &[InvocationResult],
        show_output: bool,
    ) {
        if !self.enabled {
            return;
        }

        let mut block = vec![format!(
            "{} {} ({} file{})",
            style("•").cyan(),
            style(pattern).bold(),
            files.len(),
            if files.len() == 1 { "" } else { "s" }
        )];

        for result in results {
            let marker = match result.status {
                InvocationStatus::Passed => style("✓").green(),
                InvocationStatus::Failed => style("✗").red(),
                InvocationStatus::Skipped => style("-").dim(),
            };
            let suffix = if result.output.timed_out {
                " (timed out)".to_string()
            } else if let Some(ref reason) = result.skip_reason {
                format!(" (skipped: {reason})")
            } else {
                String::new()
            };
            block.push(format!("  {marker} {}{suffix}", result.invocation.command));

            if show_output && result.status == InvocationStatus::Passed {
                for output_line in result.output.combined_output().lines() {
                    block.push(format!("      {output_line}"));
                }
            }
        }

        self.line(&block.join("\n"));
    }

    fn finish(&self) {
        if let Some(ref pb) = self.spinner {
            pb.finish_and_clear();
        }
    }
}

/// Concurrency utilities for parallel execution.
pub mod concurrency {
    /// Returns the number of available CPU cores for parallel execution.
    pub fn available_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
    }
}
