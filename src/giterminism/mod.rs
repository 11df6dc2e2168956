//! Giterminism: reproducible config reads from the head commit.
//!
//! Every file the config pipeline touches is read through [`FileReader`],
//! which decides per call whether the working tree or the head commit is the
//! source of truth:
//!
//! - In **loose** mode everything is read from the project directory.
//! - In **strict** mode files are read from the head commit and compared with
//!   the working tree; any difference is a [`GiterminismError`]. Paths listed
//!   in `werf-giterminism.yaml` for their category are read from the working
//!   tree instead.
//!
//! [`GiterminismManager`] holds the per-invocation state: the compiled
//! allow-list, the loose flag and the resolved head commit. It is built once
//! and shared read-only by every stage.

pub mod config;
pub mod error;
pub mod file_reader;

pub use config::GiterminismConfig;
pub use error::{FileCategory, GITERMINISM_CONFIG_NAME, GiterminismError, ReadLocation};
pub use file_reader::FileReader;

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::git::LocalGitRepo;
use crate::utils::fs::regular_file_exists;
use crate::utils::safe_join;

/// How the manager is set up for one invocation.
#[derive(Debug, Clone)]
pub struct GiterminismOptions {
    /// Read everything from the working tree.
    pub loose: bool,
    /// Project-relative path of the allow-list document.
    pub config_path: String,
}

impl Default for GiterminismOptions {
    fn default() -> Self {
        Self {
            loose: false,
            config_path: GITERMINISM_CONFIG_NAME.to_string(),
        }
    }
}

/// Immutable resolver state for one invocation.
pub struct GiterminismManager {
    project_dir: PathBuf,
    loose: bool,
    config: GiterminismConfig,
    repo: Option<Arc<dyn LocalGitRepo>>,
    head_commit: Option<String>,
}

impl std::fmt::Debug for GiterminismManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GiterminismManager")
            .field("project_dir", &self.project_dir)
            .field("loose", &self.loose)
            .field("head_commit", &self.head_commit)
            .finish_non_exhaustive()
    }
}

impl GiterminismManager {
    /// Resolves the head commit and loads the allow-list.
    ///
    /// Strict mode requires a repository. The allow-list is read from the head
    /// commit and must match the working tree; when it is not committed the
    /// allow-list is empty. Loose mode ignores the allow-list entirely.
    pub fn new(
        project_dir: impl AsRef<Path>,
        repo: Option<Arc<dyn LocalGitRepo>>,
        options: &GiterminismOptions,
    ) -> Result<Self> {
        let project_dir = project_dir.as_ref().to_path_buf();

        if options.loose {
            tracing::debug!("Loose giterminism: reading everything from {}", project_dir.display());
            return Ok(Self {
                project_dir,
                loose: true,
                config: GiterminismConfig::default(),
                repo,
                head_commit: None,
            });
        }

        let repo = repo.ok_or_else(|| {
            anyhow!(
                "{} is not a git repository: commit the project or use --loose-giterminism",
                project_dir.display()
            )
        })?;
        let head_commit = repo.head_commit()?;
        tracing::debug!("Using head commit {}", head_commit);

        let config =
            load_giterminism_config(&project_dir, repo.as_ref(), &head_commit, &options.config_path)?;

        Ok(Self {
            project_dir,
            loose: false,
            config,
            repo: Some(repo),
            head_commit: Some(head_commit),
        })
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    #[must_use]
    pub const fn loose_giterminism(&self) -> bool {
        self.loose
    }

    #[must_use]
    pub const fn config(&self) -> &GiterminismConfig {
        &self.config
    }

    /// The repository, if the project is inside one.
    #[must_use]
    pub fn repo(&self) -> Option<&dyn LocalGitRepo> {
        self.repo.as_deref()
    }

    pub fn local_git_repo(&self) -> Result<&dyn LocalGitRepo> {
        self.repo().ok_or_else(|| anyhow!("the project directory is not a git repository"))
    }

    pub fn head_commit(&self) -> Result<&str> {
        self.head_commit.as_deref().ok_or_else(|| anyhow!("the head commit is not resolved"))
    }
}

fn load_giterminism_config(
    project_dir: &Path,
    repo: &dyn LocalGitRepo,
    commit: &str,
    rel_path: &str,
) -> Result<GiterminismConfig> {
    if !repo.is_commit_file_exist(commit, rel_path)? {
        let working_path = safe_join(project_dir, rel_path)?;
        if regular_file_exists(&working_path)? {
            return Err(GiterminismError::UntrackedFile {
                category: FileCategory::GiterminismConfig,
                path: rel_path.to_string(),
            }
            .into());
        }
        tracing::debug!("No {} in commit {}, using an empty allow-list", rel_path, commit);
        return Ok(GiterminismConfig::default());
    }

    let data = repo.read_commit_file(commit, rel_path)?;
    let working_path = safe_join(project_dir, rel_path)?;
    if !file_reader::is_working_file_identical(&working_path, &data)? {
        return Err(GiterminismError::UncommittedChanges {
            category: FileCategory::GiterminismConfig,
            path: rel_path.to_string(),
        }
        .into());
    }

    GiterminismConfig::from_yaml(&data).with_context(|| format!("invalid {rel_path}"))
}
