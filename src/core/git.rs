//! Git repository operations.
//!
//! This module provides the repository root, hooks directory and the file
//! lists that feed the dispatcher (staged or tracked files).

use crate::core::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Represents a Git repository.
#[derive(Debug, Clone)]
pub struct GitRepo {
    /// Root directory of the repository (where .git is).
    root: PathBuf,
    /// Path to the .git directory (or file for worktrees).
    git_dir: PathBuf,
}

impl GitRepo {
    /// Discovers the Git repository from the current directory.
    pub fn discover() -> Result<Self> {
        Self::discover_from(&std::env::current_dir().map_err(|e| Error::io("get current dir", e))?)
    }

    /// Discovers the Git repository from a specific path.
    pub fn discover_from(path: &Path) -> Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel", "--git-dir"])
            .current_dir(path)
            .output()
            .map_err(|e| Error::io("run git rev-parse", e))?;

        if !output.status.success() {
            return Err(Error::NotGitRepo);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();

        let root = lines.next().map(PathBuf::from).ok_or(Error::NotGitRepo)?;

        let git_dir = lines
            .next()
            .map(|s| {
                let p = PathBuf::from(s);
                if p.is_absolute() {
                    p
                } else {
                    path.join(p)
                }
            })
            .ok_or(Error::NotGitRepo)?;

        Ok(Self { root, git_dir })
    }

    /// Returns the root directory of the repository.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the hooks directory path.
    #[must_use]
    pub fn hooks_dir(&self) -> PathBuf {
        if let Ok(output) = Command::new("git")
            .args(["config", "--get", "core.hooksPath"])
            .current_dir(&self.root)
            .output()
        {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    let hooks_path = PathBuf::from(&path);
                    if hooks_path.is_absolute() {
                        return hooks_path;
                    }
                    return self.root.join(hooks_path);
                }
            }
        }

        self.git_dir.join("hooks")
    }

    /// Returns the path to a specific hook.
    #[must_use]
    pub fn hook_path(&self, hook_name: &str) -> PathBuf {
        self.hooks_dir().join(hook_name)
    }

    /// Returns staged files (added, copied, modified, renamed), relative to the root.
    pub fn staged_files(&self) -> Result<Vec<String>> {
        self.list_files(
            "diff --cached",
            &["diff", "--cached", "--name-only", "--diff-filter=ACMR", "-z"],
        )
    }

    /// Returns every tracked file, relative to the root.
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        self.list_files("ls-files", &["ls-files", "-z"])
    }

    fn list_files(&self, operation: &str, args: &[&str]) -> Result<Vec<String>> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::io(format!("run git {operation}"), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::git(operation, stderr.trim().to_string()));
        }

        let files = split_nul(&output.stdout);
        tracing::debug!(operation, count = files.len(), "listed files");
        Ok(files)
    }
}

/// Splits NUL-separated command output, dropping empty entries.
#[must_use]
pub fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git(path: &Path, args: &[&str]) {
        Command::new("git")
            .args(args)
            .current_dir(path)
            .output()
            .expect("run git");
    }

    fn create_test_repo() -> (TempDir, GitRepo) {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path();

        git(path, &["init"]);
        git(path, &["config", "user.email", "test@test.com"]);
        git(path, &["config", "user.name", "Test"]);

        let repo = GitRepo::discover_from(path).expect("discover repo");
        (temp, repo)
    }

    // =========================================================================
    // Discovery tests
    // =========================================================================

    #[test]
    fn test_discover_repo() {
        let (_temp, repo) = create_test_repo();
        assert!(repo.root().exists());
        assert!(repo.git_dir.exists());
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let (temp, _) = create_test_repo();

        let subdir = temp.path().join("src/lib");
        std::fs::create_dir_all(&subdir).expect("create subdir");

        let repo = GitRepo::discover_from(&subdir).expect("discover from subdir");
        // Canonicalize both paths to handle macOS /var -> /private/var symlinks
        let expected = temp.path().canonicalize().expect("canonicalize temp");
        let actual = repo.root().canonicalize().expect("canonicalize root");
        assert_eq!(actual, expected);
        assert!(repo.git_dir.exists());
    }

    #[test]
    fn test_not_git_repo() {
        let temp = TempDir::new().expect("create temp dir");
        let result = GitRepo::discover_from(temp.path());
        assert!(matches!(result, Err(Error::NotGitRepo)));
    }

    // =========================================================================
    // Hooks tests
    // =========================================================================

    #[test]
    fn test_hook_path() {
        let (_temp, repo) = create_test_repo();
        let hook_path = repo.hook_path("pre-commit");
        assert!(hook_path.ends_with("hooks/pre-commit"));
    }

    #[test]
    fn test_hooks_dir_honors_core_hooks_path() {
        let (temp, repo) = create_test_repo();
        git(temp.path(), &["config", "core.hooksPath", ".githooks"]);
        assert!(repo.hooks_dir().ends_with(".githooks"));
    }

    // =========================================================================
    // File listing tests
    // =========================================================================

    #[test]
    fn test_staged_files_empty() {
        let (_temp, repo) = create_test_repo();
        let staged = repo.staged_files().expect("get staged files");
        assert!(staged.is_empty());
    }

    #[test]
    fn test_staged_files_are_root_relative() {
        let (temp, repo) = create_test_repo();

        std::fs::create_dir_all(temp.path().join("docs")).expect("create dir");
        std::fs::write(temp.path().join("docs/read me.md"), "# hi").expect("write file");
        std::fs::write(temp.path().join("b.ts"), "let x = 1;").expect("write file");
        std::fs::write(temp.path().join("unstaged.txt"), "x").expect("write file");
        git(temp.path(), &["add", "docs", "b.ts"]);

        let mut staged = repo.staged_files().expect("get staged files");
        staged.sort();
        assert_eq!(staged, ["b.ts", "docs/read me.md"]);
    }

    #[test]
    fn test_staged_files_skip_deletions() {
        let (temp, repo) = create_test_repo();

        std::fs::write(temp.path().join("gone.md"), "x").expect("write file");
        git(temp.path(), &["add", "."]);
        git(temp.path(), &["commit", "-m", "initial"]);
        git(temp.path(), &["rm", "-q", "gone.md"]);

        let staged = repo.staged_files().expect("get staged files");
        assert!(staged.is_empty());
    }

    #[test]
    fn test_tracked_files() {
        let (temp, repo) = create_test_repo();

        std::fs::write(temp.path().join("a.md"), "x").expect("write file");
        std::fs::write(temp.path().join("untracked.md"), "x").expect("write file");
        git(temp.path(), &["add", "a.md"]);

        assert_eq!(repo.tracked_files().expect("list"), ["a.md"]);
    }

    #[test]
    fn test_split_nul() {
        assert_eq!(split_nul(b"a.md\0b c.ts\0\0"), ["a.md", "b c.ts"]);
        assert!(split_nul(b"").is_empty());
    }
}
