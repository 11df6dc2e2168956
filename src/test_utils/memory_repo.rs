//! An in-memory [`LocalGitRepo`] for resolver unit tests.

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;

use crate::git::LocalGitRepo;

/// A single fake commit: a map of project-relative paths to contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryGitRepo {
    files: BTreeMap<String, Vec<u8>>,
    origin_url: Option<String>,
}

impl MemoryGitRepo {
    /// Id reported as the head commit.
    pub const HEAD: &'static str = "0123456789abcdef0123456789abcdef01234567";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` with `content` to the commit.
    #[must_use]
    pub fn with_file(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.files.insert(path.to_string(), content.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn with_origin_url(mut self, url: &str) -> Self {
        self.origin_url = Some(url.to_string());
        self
    }

    fn check_commit(commit: &str) -> Result<()> {
        if commit == Self::HEAD {
            Ok(())
        } else {
            Err(anyhow!("unknown commit {commit}"))
        }
    }
}

impl LocalGitRepo for MemoryGitRepo {
    fn head_commit(&self) -> Result<String> {
        Ok(Self::HEAD.to_string())
    }

    fn read_commit_file(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        Self::check_commit(commit)?;
        self.files.get(path).cloned().ok_or_else(|| anyhow!("path '{path}' does not exist in {commit}"))
    }

    fn is_commit_file_exist(&self, commit: &str, path: &str) -> Result<bool> {
        Self::check_commit(commit)?;
        Ok(self.files.contains_key(path))
    }

    fn is_commit_directory_exist(&self, commit: &str, path: &str) -> Result<bool> {
        Self::check_commit(commit)?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self.files.keys().any(|file| file.starts_with(&prefix)))
    }

    fn commit_file_paths(&self, commit: &str) -> Result<Vec<String>> {
        Self::check_commit(commit)?;
        Ok(self.files.keys().cloned().collect())
    }

    fn remote_origin_url(&self) -> Result<Option<String>> {
        Ok(self.origin_url.clone())
    }
}
