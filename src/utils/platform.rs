//! Platform-specific helpers used by the git wrapper and the file readers.
//!
//! Paths that cross the boundary between the working tree and the git object
//! database are always handled in their forward-slash form, because that is the
//! only form git accepts inside `<commit>:<path>` specs and `ls-tree` output.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Returns `true` when compiled for Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Returns the name of the git executable for the current platform.
///
/// - **Windows**: `git.exe`
/// - **Unix-like**: `git`, resolved through `PATH`
#[must_use]
pub const fn get_git_command() -> &'static str {
    if is_windows() {
        "git.exe"
    } else {
        "git"
    }
}

/// Checks whether a command is resolvable through `PATH`.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Normalizes a path to forward slashes for matching and for git path specs.
///
/// A leading `./` is dropped so that `./werf.yaml` and `werf.yaml` compare equal.
#[must_use]
pub fn normalize_path_for_storage<P: AsRef<Path>>(path: P) -> String {
    let normalized = path.as_ref().to_string_lossy().replace('\\', "/");
    let mut trimmed = normalized.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Joins a project-relative path onto the project directory.
///
/// Absolute paths and `..` components that climb above the project directory
/// are rejected: every file a config render touches must live inside the project.
pub fn safe_join(base: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() || relative.starts_with('/') {
        bail!("path '{relative}' must be relative to the project directory");
    }

    let mut depth: usize = 0;
    for component in candidate.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    bail!("path '{relative}' points outside the project directory");
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("path '{relative}' must be relative to the project directory");
            }
        }
    }

    Ok(base.join(candidate))
}
