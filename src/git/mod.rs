//! Read-only access to the project's local git repository.
//!
//! The config pipeline only ever reads from git: it resolves the head commit
//! once, then reads blobs, checks paths and lists files at that commit. Like
//! the rest of the crate it shells out to the system `git` binary instead of
//! embedding a git implementation, so it works with whatever repository layout
//! and configuration the user already has.
//!
//! All paths passed to and returned from [`LocalGitRepo`] are relative to the
//! project directory (which may be a subdirectory of the repository) and use
//! forward slashes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use werf_config::git::{GitRepo, LocalGitRepo};
//!
//! # fn example() -> anyhow::Result<()> {
//! if let Some(repo) = GitRepo::open("/path/to/project")? {
//!     let head = repo.head_commit()?;
//!     let data = repo.read_commit_file(&head, "werf.yaml")?;
//!     println!("{} bytes", data.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod command_builder;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::core::WerfError;
use crate::utils::normalize_path_for_storage;
use command_builder::GitCommand;

/// The version-control operations the giterminism resolver depends on.
///
/// Implemented by [`GitRepo`] for real repositories and by an in-memory fake
/// in tests.
pub trait LocalGitRepo: Send + Sync {
    /// Full id of the current head commit.
    fn head_commit(&self) -> Result<String>;

    /// Content of `path` at `commit`.
    fn read_commit_file(&self, commit: &str, path: &str) -> Result<Vec<u8>>;

    /// Whether `path` is a file (blob or symlink) at `commit`.
    fn is_commit_file_exist(&self, commit: &str, path: &str) -> Result<bool>;

    /// Whether `path` is a directory at `commit`.
    fn is_commit_directory_exist(&self, commit: &str, path: &str) -> Result<bool>;

    /// Every file below the project directory at `commit`, sorted.
    fn commit_file_paths(&self, commit: &str) -> Result<Vec<String>>;

    /// URL of the `origin` remote, if one is configured.
    fn remote_origin_url(&self) -> Result<Option<String>>;
}

/// A repository accessed through the system `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepo {
    project_dir: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum TreeEntryKind {
    Blob,
    Tree,
    Other,
}

impl GitRepo {
    /// Opens the repository containing `project_dir`.
    ///
    /// Returns `Ok(None)` when the directory is not inside a git work tree.
    pub fn open(project_dir: impl AsRef<Path>) -> Result<Option<Self>> {
        ensure_git_available()?;
        let project_dir = project_dir.as_ref().to_path_buf();

        match GitCommand::show_toplevel().current_dir(&project_dir).execute_stdout() {
            Ok(toplevel) => {
                tracing::debug!(target: "git", "Using git work tree {}", toplevel);
                Ok(Some(Self {
                    project_dir,
                }))
            }
            Err(err) => {
                tracing::debug!(
                    target: "git",
                    "{} is not a git work tree: {}",
                    project_dir.display(),
                    err
                );
                Ok(None)
            }
        }
    }

    /// Project directory the repository was opened for.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.project_dir
    }

    fn command(&self, cmd: GitCommand) -> GitCommand {
        cmd.current_dir(&self.project_dir)
    }

    fn tree_entry_kind(&self, commit: &str, path: &str) -> Result<Option<TreeEntryKind>> {
        let path = normalize_path_for_storage(path);
        let output = self
            .command(GitCommand::ls_tree_entry(commit, &path))
            .execute_bytes()
            .with_context(|| format!("unable to inspect '{path}' at commit {commit}"))?;

        Ok(parse_tree_entry(&String::from_utf8_lossy(&output), &path))
    }
}

/// Finds `path` among NUL-terminated `<mode> <type> <object>\t<name>` records.
fn parse_tree_entry(output: &str, path: &str) -> Option<TreeEntryKind> {
    let wanted = path.trim_end_matches('/');
    output.split('\0').find_map(|record| {
        let (meta, name) = record.split_once('\t')?;
        if name.trim_end_matches('/') != wanted {
            return None;
        }
        Some(match meta.split_whitespace().nth(1) {
            Some("blob") => TreeEntryKind::Blob,
            Some("tree") => TreeEntryKind::Tree,
            _ => TreeEntryKind::Other,
        })
    })
}

impl LocalGitRepo for GitRepo {
    fn head_commit(&self) -> Result<String> {
        self.command(GitCommand::rev_parse("HEAD"))
            .with_context("resolving head commit")
            .execute_stdout()
            .context("unable to resolve the head commit of the project git repository")
    }

    fn read_commit_file(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path_for_storage(path);
        self.command(GitCommand::cat_file_blob(commit, &path))
            .execute_bytes()
            .with_context(|| format!("unable to read '{path}' at commit {commit}"))
    }

    fn is_commit_file_exist(&self, commit: &str, path: &str) -> Result<bool> {
        Ok(self.tree_entry_kind(commit, path)? == Some(TreeEntryKind::Blob))
    }

    fn is_commit_directory_exist(&self, commit: &str, path: &str) -> Result<bool> {
        Ok(self.tree_entry_kind(commit, path)? == Some(TreeEntryKind::Tree))
    }

    fn commit_file_paths(&self, commit: &str) -> Result<Vec<String>> {
        let output = self
            .command(GitCommand::ls_tree_files(commit))
            .execute_bytes()
            .with_context(|| format!("unable to list files at commit {commit}"))?;

        let mut paths: Vec<String> = output
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn remote_origin_url(&self) -> Result<Option<String>> {
        match self.command(GitCommand::remote_origin_url()).execute_stdout() {
            Ok(url) if !url.is_empty() => Ok(Some(url)),
            Ok(_) => Ok(None),
            Err(err) => match err.downcast_ref::<WerfError>() {
                Some(WerfError::GitCommandError {
                    ..
                }) => Ok(None),
                _ => Err(err),
            },
        }
    }
}

/// Checks if Git is installed and accessible on the system.
#[must_use]
pub fn is_git_installed() -> bool {
    crate::utils::platform::command_exists(crate::utils::platform::get_git_command())
}

/// Ensures Git is available, returning [`WerfError::GitNotFound`] otherwise.
pub fn ensure_git_available() -> Result<()> {
    if !is_git_installed() {
        return Err(WerfError::GitNotFound.into());
    }
    Ok(())
}

/// Repository name from a remote URL: the last path segment without `.git`.
///
/// Handles HTTPS, `ssh://`, scp-like `git@host:group/repo.git` and local paths.
#[must_use]
pub fn repo_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let path = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => match trimmed.split_once(':') {
            // scp-like syntax, but not a Windows drive letter
            Some((host, rest)) if host.len() > 1 => rest,
            _ => trimmed,
        },
    };

    let name = path.rsplit('/').next()?.trim_end_matches(".git");
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_from_url() {
        assert_eq!(
            repo_name_from_url("https://github.com/werf/demo-app.git").as_deref(),
            Some("demo-app")
        );
        assert_eq!(repo_name_from_url("git@gitlab.com:group/sub/App.git").as_deref(), Some("App"));
        assert_eq!(
            repo_name_from_url("ssh://git@host:2222/group/repo").as_deref(),
            Some("repo")
        );
        assert_eq!(repo_name_from_url("/srv/git/project.git/").as_deref(), Some("project"));
        assert_eq!(repo_name_from_url("https://host/").as_deref(), Some("host"));
        assert_eq!(repo_name_from_url(""), None);
    }

    #[test]
    fn test_parse_tree_entry() {
        let output = "100644 blob 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\tconf/café.ini\0";
        assert_eq!(parse_tree_entry(output, "conf/café.ini"), Some(TreeEntryKind::Blob));
        assert_eq!(parse_tree_entry(output, "conf/cafe.ini"), None);

        let output = "040000 tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\tconf\0";
        assert_eq!(parse_tree_entry(output, "conf/"), Some(TreeEntryKind::Tree));

        let output = "160000 commit 4b825dc642cb6eb9a060e54bf8d69288fbee4904\tvendor/lib\0";
        assert_eq!(parse_tree_entry(output, "vendor/lib"), Some(TreeEntryKind::Other));

        // Names are not quoted and may hold tabs or newlines
        let output = "100644 blob 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\tweird\nname\0";
        assert_eq!(parse_tree_entry(output, "weird\nname"), Some(TreeEntryKind::Blob));
        assert_eq!(parse_tree_entry("", "anything"), None);
    }
}
