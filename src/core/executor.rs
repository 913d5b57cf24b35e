//! Process execution for planned invocations.
//!
//! Commands run directly (program plus argument vector) unless shell mode
//! is requested. Children are killed when the future awaiting them is
//! dropped, which is how cancellation reaches running tools.

use crate::core::error::{Error, Result};
use crate::core::plan::CommandInvocation;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

/// Exit code reported when a command exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Output from a command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Whether the command was killed due to timeout.
    pub timed_out: bool,
    /// Duration the command took to run.
    pub duration: Duration,
}

impl CommandOutput {
    /// Returns true if the command succeeded (exit code 0).
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Returns combined stdout and stderr output.
    #[must_use]
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        if stderr.is_empty() {
            stdout.to_string()
        } else if stdout.is_empty() {
            stderr.to_string()
        } else {
            format!("{stdout}\n{stderr}")
        }
    }
}

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// Launch `program` with `args`, no shell involved.
    Direct {
        /// Executable name or path.
        program: String,
        /// Argument vector.
        args: Vec<String>,
    },
    /// Hand a command line to the platform shell.
    Shell(String),
}

impl CommandSpec {
    /// Builds the spec for a planned invocation.
    ///
    /// Shell mode quotes files for `sh` on unix and for `cmd.exe` on Windows.
    #[must_use]
    pub fn for_invocation(invocation: &CommandInvocation, use_shell: bool) -> Self {
        if use_shell && cfg!(windows) {
            Self::Shell(cmd_exe_line(invocation))
        } else if use_shell {
            Self::Shell(invocation.command_line())
        } else {
            Self::Direct {
                program: invocation.program.clone(),
                args: invocation.argv().into_iter().map(String::from).collect(),
            }
        }
    }

    fn program_name(&self) -> &str {
        match self {
            Self::Direct { program, .. } => program,
            Self::Shell(line) => line.split_whitespace().next().unwrap_or(line),
        }
    }
}

/// `cmd.exe` has no single quotes: files with spaces or metacharacters get
/// double quotes. Windows file names cannot contain `"` themselves.
fn cmd_exe_line(invocation: &CommandInvocation) -> String {
    let mut line = invocation.command.clone();
    for file in &invocation.files {
        line.push(' ');
        if file.contains(|c: char| c.is_whitespace() || "&|<>^()%!,;=".contains(c)) {
            line.push('"');
            line.push_str(file);
            line.push('"');
        } else {
            line.push_str(file);
        }
    }
    line
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    // Passed verbatim: the default argument escaping is not understood by cmd.exe.
    cmd.arg("/C").raw_arg(line);
    cmd
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Working directory for the command.
    pub cwd: Option<PathBuf>,
    /// Timeout for the command.
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, path: impl AsRef<Path>) -> Self {
        self.cwd = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout = duration;
        self
    }
}

/// Executor for running external commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor;

impl Executor {
    /// Creates a new executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Executes a command and waits for it to exit.
    pub async fn execute(&self, spec: &CommandSpec, options: &ExecuteOptions) -> Result<CommandOutput> {
        let start = std::time::Instant::now();

        let mut cmd = match spec {
            CommandSpec::Direct { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            },
            CommandSpec::Shell(line) => shell_command(line),
        };

        if let Some(ref cwd) = options.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = ?spec, cwd = ?options.cwd, "spawning");

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CommandNotFound {
                    command: spec.program_name().to_string(),
                }
            } else {
                Error::io(format!("spawn {}", spec.program_name()), e)
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let wait = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
            let status = status.map_err(|e| Error::io("wait for command", e))?;
            Ok::<_, Error>((exit_code_of(status), stdout, stderr))
        };

        let finished = match options.timeout {
            Some(limit) => timeout(limit, wait).await.ok(),
            None => Some(wait.await),
        };

        let Some(result) = finished else {
            let limit = options.timeout.unwrap_or_default();
            tracing::warn!(command = spec.program_name(), ?limit, "command timed out");
            // Ignore the result: the child may already have exited.
            drop(child.kill().await);
            return Ok(CommandOutput {
                exit_code: TIMEOUT_EXIT_CODE,
                stdout: String::new(),
                stderr: format!(
                    "Command timed out after {}",
                    humantime::format_duration(limit)
                ),
                timed_out: true,
                duration: start.elapsed(),
            });
        };

        let (exit_code, stdout, stderr) = result?;

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            timed_out: false,
            duration: start.elapsed(),
        })
    }

    /// Checks if a command exists in PATH.
    #[must_use]
    pub fn command_exists(command: &str) -> bool {
        which::which(command).is_ok()
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        tracing::debug!(error = %e, "output stream closed early");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
