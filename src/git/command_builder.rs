//! Type-safe Git command builder for consistent command execution
//!
//! This module provides a fluent API for building and executing Git commands
//! against the system `git` binary. Every commit-relative read performed while
//! rendering a werf config goes through here, so all commands are synchronous:
//! the config pipeline runs strictly in sequence and never needs a runtime.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::WerfError;
use crate::utils::platform::get_git_command;

/// Builder for constructing and executing Git commands with consistent error handling.
///
/// # Examples
///
/// ```rust,no_run
/// use werf_config::git::command_builder::GitCommand;
///
/// # fn example() -> anyhow::Result<()> {
/// let head = GitCommand::rev_parse("HEAD")
///     .current_dir("/path/to/project")
///     .with_context("resolving head commit")
///     .execute_stdout()?;
/// # Ok(())
/// # }
/// ```
///
/// # Default Configuration
///
/// - **Output capture**: Enabled
/// - **Working directory**: Current process directory (passed with `-C` when set)
/// - **Environment**: Inherits from parent process
#[derive(Debug, Default)]
pub struct GitCommand {
    /// Command arguments to pass to Git (e.g., ["ls-tree", "-r", "HEAD"])
    args: Vec<String>,

    /// Working directory for command execution
    current_dir: Option<PathBuf>,

    /// Environment variables to set for the Git process
    env_vars: Vec<(String, String)>,

    /// Optional context string for log lines
    context: Option<String>,
}

/// Output from a Git command.
///
/// `stdout` is kept as raw bytes because file blobs read from a commit are
/// compared byte-for-byte with the working tree.
#[derive(Debug)]
pub struct GitCommandOutput {
    /// Standard output from the Git command
    pub stdout: Vec<u8>,
    /// Standard error output from the Git command
    pub stderr: String,
}

impl GitCommand {
    /// Creates a new Git command builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the working directory, passed to git as `-C <dir>`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the git process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Adds a context label that prefixes every log line of this command.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn full_args(&self) -> Vec<String> {
        let mut full_args = Vec::new();
        if let Some(ref dir) = self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        full_args
    }

    /// Name of the git subcommand, skipping the `-C <dir>` prefix.
    fn operation(full_args: &[String]) -> String {
        let args_start = if full_args.first().is_some_and(|a| a == "-C") && full_args.len() > 2 {
            2
        } else {
            0
        };
        full_args.get(args_start).cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Execute the command and return the output.
    ///
    /// A non-zero exit status becomes [`WerfError::GitCommandError`] carrying stderr.
    pub fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let git_command = get_git_command();
        let full_args = self.full_args();

        match self.context {
            Some(ref ctx) => tracing::debug!(
                target: "git",
                "({}) Executing command: {} {}",
                ctx,
                git_command,
                full_args.join(" ")
            ),
            None => tracing::debug!(
                target: "git",
                "Executing command: {} {}",
                git_command,
                full_args.join(" ")
            ),
        }

        let mut cmd = Command::new(git_command);
        cmd.args(&full_args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "git", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        let output =
            cmd.output().with_context(|| format!("Failed to execute git {}", full_args.join(" ")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "Command failed with exit code: {:?}",
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "git", "Error: {}", stderr.trim());
            }

            return Err(WerfError::GitCommandError {
                operation: Self::operation(&full_args),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "git::perf",
                "Git {} took {:.2}s",
                Self::operation(&full_args),
                elapsed.as_secs_f64()
            );
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(
                target: "git::perf",
                "Git {} took {}ms",
                Self::operation(&full_args),
                elapsed.as_millis()
            );
        }

        Ok(GitCommandOutput {
            stdout: output.stdout,
            stderr,
        })
    }

    /// Execute the command and return stdout as a trimmed string.
    pub fn execute_stdout(self) -> Result<String> {
        let output = self.execute()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Execute the command and return raw stdout bytes.
    pub fn execute_bytes(self) -> Result<Vec<u8>> {
        Ok(self.execute()?.stdout)
    }
}

// Convenience builders for the read-only operations the config pipeline needs

impl GitCommand {
    /// `git rev-parse <ref>`
    pub fn rev_parse(ref_name: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", ref_name])
    }

    /// `git cat-file blob <commit>:./<path>`, relative to the working directory
    pub fn cat_file_blob(commit: &str, path: &str) -> Self {
        Self::new().args(["cat-file", "blob"]).arg(format!("{commit}:./{path}"))
    }

    /// `git ls-tree -z <commit> -- <path>` describing a single entry
    pub fn ls_tree_entry(commit: &str, path: &str) -> Self {
        Self::new().args(["ls-tree", "-z", commit, "--", path])
    }

    /// `git ls-tree -r -z --name-only <commit>` listing every file below the working directory
    pub fn ls_tree_files(commit: &str) -> Self {
        Self::new().args(["ls-tree", "-r", "-z", "--name-only", commit])
    }

    /// `git remote get-url origin`
    pub fn remote_origin_url() -> Self {
        Self::new().args(["remote", "get-url", "origin"])
    }

    /// `git rev-parse --show-toplevel`
    pub fn show_toplevel() -> Self {
        Self::new().args(["rev-parse", "--show-toplevel"])
    }
}
