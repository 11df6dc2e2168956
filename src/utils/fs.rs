//! Filesystem helpers for reading project files from the working tree.
//!
//! Everything here works with project-relative, forward-slash paths so results
//! can be compared directly with paths listed from a git commit.

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::platform::normalize_path_for_storage;

/// Matching options shared by every glob in the crate.
///
/// `*` never crosses a `/`, while a `**` component spans any number of directories.
#[must_use]
pub const fn glob_match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Compiles a glob pattern with a descriptive error.
pub fn compile_glob(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).with_context(|| format!("invalid glob pattern '{pattern}'"))
}

/// Returns `true` if `path` matches `pattern` under [`glob_match_options`].
#[must_use]
pub fn glob_matches(pattern: &Pattern, path: &str) -> bool {
    pattern.matches_with(path, glob_match_options())
}

fn is_not_exist_error(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}

/// Returns `true` if `path` exists and resolves to a regular file.
pub fn regular_file_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(err) if is_not_exist_error(&err) => Ok(false),
        Err(err) => {
            Err(err).with_context(|| format!("unable to check existence of {}", path.display()))
        }
    }
}

/// Returns `true` if `path` exists and resolves to a directory.
pub fn dir_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(err) if is_not_exist_error(&err) => Ok(false),
        Err(err) => Err(err)
            .with_context(|| format!("unable to check existence of directory {}", path.display())),
    }
}

/// A working-tree file selected by [`walk_by_pattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    /// Project-relative path with forward slashes, as the entry appears in the tree.
    pub rel_path: String,
    /// Absolute path to read the content from.
    pub path: PathBuf,
}

/// The directory prefix of a glob pattern that contains no wildcard characters.
fn literal_base(pattern: &str) -> String {
    pattern
        .split('/')
        .take_while(|part| !part.contains(['*', '?', '[', '{']))
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks the project directory and returns every regular file whose
/// project-relative path matches `pattern`.
///
/// Symlinks are followed only when they point to a regular file; a symlink to a
/// directory is skipped and never descended into. `.git` directories are not
/// part of the project and are never walked. Results are ordered by path.
pub fn walk_by_pattern(project_dir: &Path, pattern: &str) -> Result<Vec<MatchedFile>> {
    let compiled = compile_glob(pattern)?;

    // Start from the literal prefix, then fall back to its parent when the
    // prefix names a single file rather than a directory.
    let base = literal_base(pattern);
    if Path::new(&base).components().any(|component| component.as_os_str() == ".git") {
        return Ok(Vec::new());
    }
    let mut walk_root = project_dir.join(&base);
    if !dir_exists(&walk_root)? {
        if regular_file_exists(&walk_root)? {
            walk_root = walk_root.parent().map_or_else(|| project_dir.to_path_buf(), Path::to_path_buf);
        } else {
            return Ok(Vec::new());
        }
    }

    let mut matches = Vec::new();
    let walk = WalkDir::new(&walk_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == ".git"));
    for entry in walk {
        let entry = entry.with_context(|| format!("unable to walk {}", walk_root.display()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(project_dir) else {
            continue;
        };
        let rel_path = normalize_path_for_storage(relative);
        if !glob_matches(&compiled, &rel_path) {
            continue;
        }

        if file_type.is_symlink() {
            let target = fs::metadata(entry.path())
                .with_context(|| format!("eval symlink {} failed", entry.path().display()))?;
            if !target.is_file() {
                tracing::debug!("Skipping symlink {} that does not point to a file", rel_path);
                continue;
            }
        }

        matches.push(MatchedFile {
            rel_path,
            path: entry.path().to_path_buf(),
        });
    }

    Ok(matches)
}
