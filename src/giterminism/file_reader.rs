//! Category-aware file reads for the config pipeline.
//!
//! The same three primitives back every public method:
//!
//! 1. **existence** - working tree when the path is accepted (loose mode or
//!    allow-listed), head commit otherwise. A file that only exists in the
//!    working tree is reported as untracked.
//! 2. **read** - working tree when accepted; otherwise the commit blob, which
//!    must be identical to the working-tree file (byte-equal, or equal once
//!    CRLF is normalised to LF).
//! 3. **glob** - commit matches merged with working-tree matches, with the
//!    same acceptance rules applied per path.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use super::error::{FileCategory, GiterminismError, ReadLocation};
use super::GiterminismManager;
use crate::utils::fs::{regular_file_exists, walk_by_pattern};
use crate::utils::{compile_glob, glob_matches, normalize_path_for_storage, safe_join};

/// Config names tried in order when no custom path is given.
pub const DEFAULT_WERF_CONFIG_NAMES: [&str; 2] = ["werf.yaml", "werf.yml"];

/// Returns `true` if the working-tree file at `path` has the same content as
/// `commit_data`, allowing for CRLF line endings in the working tree.
///
/// A missing working-tree file never matches.
pub(crate) fn is_working_file_identical(path: &Path, commit_data: &[u8]) -> Result<bool> {
    if !regular_file_exists(path)? {
        return Ok(false);
    }

    let data = fs::read(path).with_context(|| format!("unable to read {}", path.display()))?;
    if data == commit_data {
        return Ok(true);
    }

    Ok(replace_crlf(&data) == commit_data)
}

fn replace_crlf(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();
    while let Some(&byte) = iter.next() {
        if byte == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        result.push(byte);
    }
    result
}

/// Reads project files according to the giterminism policy.
#[derive(Debug, Clone)]
pub struct FileReader {
    manager: Arc<GiterminismManager>,
    commit_paths: Arc<OnceLock<Vec<String>>>,
}

impl FileReader {
    #[must_use]
    pub fn new(manager: Arc<GiterminismManager>) -> Self {
        Self {
            manager,
            commit_paths: Arc::new(OnceLock::new()),
        }
    }

    #[must_use]
    pub fn manager(&self) -> &GiterminismManager {
        &self.manager
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        self.manager.project_dir()
    }

    fn is_accepted(&self, category: FileCategory, rel_path: &str) -> bool {
        self.manager.loose_giterminism()
            || self.manager.config().is_uncommitted_file_accepted(category, rel_path)
    }

    fn working_path(&self, rel_path: &str) -> Result<PathBuf> {
        safe_join(self.project_dir(), rel_path)
    }

    fn is_file_exist(&self, rel_path: &str) -> Result<bool> {
        regular_file_exists(&self.working_path(rel_path)?)
    }

    fn read_file(&self, rel_path: &str) -> Result<Vec<u8>> {
        let path = self.working_path(rel_path)?;
        tracing::debug!("Reading '{}' from the project directory", rel_path);
        fs::read(&path).with_context(|| format!("unable to read file {}", path.display()))
    }

    fn is_commit_file_exist(&self, rel_path: &str) -> Result<bool> {
        let commit = self.manager.head_commit()?;
        self.manager.local_git_repo()?.is_commit_file_exist(commit, rel_path).with_context(|| {
            format!(
                "unable to check existence of file '{rel_path}' in the project git repo commit {commit}"
            )
        })
    }

    fn commit_file_paths(&self) -> Result<&[String]> {
        if let Some(paths) = self.commit_paths.get() {
            return Ok(paths);
        }

        let commit = self.manager.head_commit()?;
        let paths = self.manager.local_git_repo()?.commit_file_paths(commit)?;
        Ok(self.commit_paths.get_or_init(|| paths).as_slice())
    }

    /// Reads `rel_path` from the head commit and fails if the working tree differs.
    fn read_commit_file(&self, category: FileCategory, rel_path: &str) -> Result<Vec<u8>> {
        let commit = self.manager.head_commit()?;
        tracing::debug!("Reading {} '{}' from commit {}", category, rel_path, commit);

        let data = self.manager.local_git_repo()?.read_commit_file(commit, rel_path).with_context(
            || format!("unable to read file '{rel_path}' from the local git repo commit {commit}"),
        )?;

        let identical = is_working_file_identical(&self.working_path(rel_path)?, &data)
            .with_context(|| {
                format!("unable to compare commit file '{rel_path}' with the local project file")
            })?;
        if !identical {
            return Err(GiterminismError::UncommittedChanges {
                category,
                path: rel_path.to_string(),
            }
            .into());
        }

        Ok(data)
    }

    fn check_file_existence(&self, category: FileCategory, rel_path: &str) -> Result<()> {
        if self.is_accepted(category, rel_path) {
            if self.is_file_exist(rel_path)? {
                return Ok(());
            }
            return Err(GiterminismError::FileNotFound {
                category,
                path: rel_path.to_string(),
                location: ReadLocation::ProjectDirectory,
            }
            .into());
        }

        if self.is_commit_file_exist(rel_path)? {
            return Ok(());
        }

        if self.is_file_exist(rel_path)? {
            return Err(GiterminismError::UntrackedFile {
                category,
                path: rel_path.to_string(),
            }
            .into());
        }

        Err(GiterminismError::FileNotFound {
            category,
            path: rel_path.to_string(),
            location: ReadLocation::GitRepository,
        }
        .into())
    }

    /// Whether a file of `category` exists where it would be read from.
    pub fn is_configuration_file_exist(&self, category: FileCategory, rel_path: &str) -> Result<bool> {
        let rel_path = normalize_path_for_storage(rel_path);
        if self.is_accepted(category, &rel_path) {
            return self.is_file_exist(&rel_path);
        }
        self.is_commit_file_exist(&rel_path)
    }

    /// Checks existence and reads a single file of `category`.
    pub fn read_configuration_file(&self, category: FileCategory, rel_path: &str) -> Result<Vec<u8>> {
        let rel_path = normalize_path_for_storage(rel_path);
        self.check_file_existence(category, &rel_path)?;

        if self.is_accepted(category, &rel_path) {
            return self.read_file(&rel_path);
        }
        self.read_commit_file(category, &rel_path)
    }

    /// Reads every file of `category` matching `pattern`, keyed by project-relative path.
    pub fn configuration_files_glob(
        &self,
        category: FileCategory,
        pattern: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        // Rejects absolute patterns and patterns climbing out of the project.
        self.working_path(pattern)?;

        let mut result = BTreeMap::new();
        let working_files = walk_by_pattern(self.project_dir(), pattern)?;

        if self.manager.loose_giterminism() {
            for file in working_files {
                let data = fs::read(&file.path)
                    .with_context(|| format!("unable to read file {}", file.path.display()))?;
                result.insert(file.rel_path, data);
            }
            return Ok(result);
        }

        let compiled = compile_glob(pattern)?;
        let commit_matches: BTreeSet<String> = self
            .commit_file_paths()?
            .iter()
            .filter(|path| glob_matches(&compiled, path))
            .cloned()
            .collect();

        for rel_path in &commit_matches {
            if self.is_accepted(category, rel_path) {
                if self.is_file_exist(rel_path)? {
                    result.insert(rel_path.clone(), self.read_file(rel_path)?);
                }
                continue;
            }
            result.insert(rel_path.clone(), self.read_commit_file(category, rel_path)?);
        }

        let mut untracked = Vec::new();
        for file in working_files {
            if commit_matches.contains(&file.rel_path) {
                continue;
            }
            if self.is_accepted(category, &file.rel_path) {
                let data = fs::read(&file.path)
                    .with_context(|| format!("unable to read file {}", file.path.display()))?;
                result.insert(file.rel_path, data);
            } else {
                untracked.push(file.rel_path);
            }
        }

        if let Some(first) = untracked.first() {
            if untracked.len() > 1 {
                tracing::debug!("{} untracked files match '{}': {:?}", untracked.len(), pattern, untracked);
            }
            return Err(GiterminismError::UntrackedFile {
                category,
                path: first.clone(),
            }
            .into());
        }

        Ok(result)
    }

    /// Reads the werf config, trying `werf.yaml` then `werf.yml` unless a custom
    /// path is given. Returns the path that was read with its content.
    pub fn read_config(&self, custom_rel_path: Option<&str>) -> Result<(String, Vec<u8>)> {
        let candidates: Vec<String> = match custom_rel_path {
            Some(path) if !path.is_empty() => vec![normalize_path_for_storage(path)],
            _ => DEFAULT_WERF_CONFIG_NAMES.iter().map(ToString::to_string).collect(),
        };

        let accepted = self.is_accepted(FileCategory::Config, "");
        for candidate in &candidates {
            let exists = if accepted {
                self.is_file_exist(candidate)?
            } else {
                self.is_commit_file_exist(candidate)?
            };
            if !exists {
                continue;
            }

            let data = if accepted {
                self.read_file(candidate)?
            } else {
                self.read_commit_file(FileCategory::Config, candidate)?
            };
            return Ok((candidate.clone(), data));
        }

        if !accepted {
            for candidate in &candidates {
                if self.is_file_exist(candidate)? {
                    return Err(GiterminismError::UntrackedFile {
                        category: FileCategory::Config,
                        path: candidate.clone(),
                    }
                    .into());
                }
            }
        }

        Err(GiterminismError::ConfigNotFound {
            paths: candidates,
            location: if self.manager.loose_giterminism() {
                ReadLocation::ProjectDirectory
            } else {
                ReadLocation::GitRepository
            },
        }
        .into())
    }

    /// Reads every `*.tmpl` file below `templates_dir`, keyed by project-relative path.
    pub fn config_templates(&self, templates_dir: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let dir = normalize_path_for_storage(templates_dir);
        let dir = dir.trim_end_matches('/');
        let pattern = if dir.is_empty() || dir == "." {
            "**/*.tmpl".to_string()
        } else {
            format!("{}/**/*.tmpl", glob::Pattern::escape(dir))
        };

        self.configuration_files_glob(FileCategory::ConfigTemplate, &pattern)
            .with_context(|| format!("unable to read config templates from '{dir}'"))
    }

    /// Content of a single file for the `files_get` template function.
    pub fn files_get(&self, rel_path: &str) -> Result<String> {
        let data = self
            .read_configuration_file(FileCategory::GoTemplateFile, rel_path)
            .with_context(|| format!("files_get('{rel_path}')"))?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Map of path to content for the `files_glob` template function.
    ///
    /// No match is not an error: a warning is logged and the map is empty.
    pub fn files_glob(&self, pattern: &str) -> Result<BTreeMap<String, String>> {
        let files = self
            .configuration_files_glob(FileCategory::GoTemplateFile, pattern)
            .with_context(|| format!("files_glob('{pattern}')"))?;

        if files.is_empty() {
            tracing::warn!("No matches in the project directory for the pattern '{}'", pattern);
        }

        Ok(files
            .into_iter()
            .map(|(path, data)| (path, String::from_utf8_lossy(&data).into_owned()))
            .collect())
    }

    /// Fails unless the template function `env` may read `name`.
    pub fn report_config_go_template_rendering_env(&self, name: &str) -> Result<()> {
        if self.manager.loose_giterminism() || self.manager.config().is_env_accepted(name) {
            return Ok(());
        }
        Err(GiterminismError::EnvNotAllowed {
            name: name.to_string(),
        }
        .into())
    }

    pub fn read_dockerfile(&self, rel_path: &str) -> Result<Vec<u8>> {
        self.read_configuration_file(FileCategory::Dockerfile, rel_path)
    }

    pub fn read_dockerignore(&self, rel_path: &str) -> Result<Vec<u8>> {
        self.read_configuration_file(FileCategory::Dockerignore, rel_path)
    }

    /// Whether a `.dockerignore` exists in the commit or, failing that, the working tree.
    pub fn is_dockerignore_exist_anywhere(&self, rel_path: &str) -> Result<bool> {
        let rel_path = normalize_path_for_storage(rel_path);
        if !self.manager.loose_giterminism() && self.is_commit_file_exist(&rel_path)? {
            return Ok(true);
        }
        self.is_file_exist(&rel_path)
    }

    pub fn read_helm_file(&self, rel_path: &str) -> Result<Vec<u8>> {
        self.read_configuration_file(FileCategory::HelmFile, rel_path)
    }

    pub fn is_helm_file_exist(&self, rel_path: &str) -> Result<bool> {
        self.is_configuration_file_exist(FileCategory::HelmFile, rel_path)
    }

    /// Whether `rel_path` is a directory where helm files would be read from.
    pub fn is_helm_directory_exist(&self, rel_path: &str) -> Result<bool> {
        let rel_path = normalize_path_for_storage(rel_path);
        if self.is_accepted(FileCategory::HelmFile, &rel_path) {
            return crate::utils::fs::dir_exists(&self.working_path(&rel_path)?);
        }
        let commit = self.manager.head_commit()?;
        self.manager.local_git_repo()?.is_commit_directory_exist(commit, &rel_path)
    }
}
