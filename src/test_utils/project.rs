//! Temporary project directories with an optional real git repository.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use super::git_helper::TestGit;
use crate::git::{GitRepo, LocalGitRepo};
use crate::giterminism::{FileReader, GiterminismManager, GiterminismOptions};

/// A project directory that lives as long as the value.
pub struct TestProject {
    temp_dir: TempDir,
    git: Option<TestGit>,
}

impl TestProject {
    /// An empty directory without git.
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new().context("Failed to create temp directory")?,
            git: None,
        })
    }

    /// An empty directory with an initialized repository and a test identity.
    pub fn with_git() -> Result<Self> {
        let mut project = Self::new()?;
        let git = TestGit::new(project.path());
        git.init()?;
        git.config_user()?;
        project.git = Some(git);
        Ok(project)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `content` to the project-relative `rel_path`, creating directories.
    pub fn write(&self, rel_path: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let path = self.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn remove(&self, rel_path: &str) -> Result<()> {
        fs::remove_file(self.path().join(rel_path))
            .with_context(|| format!("Failed to remove {rel_path}"))
    }

    pub fn git(&self) -> Result<&TestGit> {
        self.git.as_ref().context("project was created without git")
    }

    /// Stages and commits the whole working tree.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git()?.commit_all(message)
    }

    /// Builds a file reader over the project.
    pub fn reader(&self, loose: bool) -> Result<FileReader> {
        let repo = GitRepo::open(self.path())?.map(|repo| Arc::new(repo) as Arc<dyn LocalGitRepo>);
        let options = GiterminismOptions {
            loose,
            ..Default::default()
        };
        let manager = GiterminismManager::new(self.path(), repo, &options)?;
        Ok(FileReader::new(Arc::new(manager)))
    }
}
