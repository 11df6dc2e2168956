//! The `werf-giterminism.yaml` allow-list.
//!
//! Path entries are glob patterns matched against project-relative paths; a
//! pattern that matches a directory also accepts every file below it. Env
//! entries are globs or `/regex/`.

use anyhow::{Context, Result, bail};
use glob::Pattern;
use regex::Regex;
use serde::Deserialize;

use super::error::FileCategory;
use crate::utils::{compile_glob, glob_matches, normalize_path_for_storage};

/// The document as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawGiterminismConfig {
    #[serde(default)]
    pub giterminism_config_version: Option<u32>,
    #[serde(default)]
    pub config: RawConfigSection,
    #[serde(default)]
    pub helm: RawHelmSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfigSection {
    #[serde(default)]
    pub allow_uncommitted: bool,
    #[serde(default)]
    pub allow_uncommitted_templates: Vec<String>,
    #[serde(default)]
    pub go_template_rendering: RawGoTemplateRendering,
    #[serde(default)]
    pub dockerfile: RawDockerfileSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawGoTemplateRendering {
    #[serde(default)]
    pub allow_env_variables: Vec<String>,
    #[serde(default)]
    pub allow_uncommitted_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawDockerfileSection {
    #[serde(default)]
    pub allow_uncommitted: Vec<String>,
    #[serde(default)]
    pub allow_uncommitted_dockerignore_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawHelmSection {
    #[serde(default)]
    pub allow_uncommitted_files: Vec<String>,
}

#[derive(Debug, Clone)]
enum EnvMatcher {
    Glob(Pattern),
    Regex(Regex),
}

impl EnvMatcher {
    fn parse(entry: &str) -> Result<Self> {
        if entry.len() >= 2 && entry.starts_with('/') && entry.ends_with('/') {
            let expr = &entry[1..entry.len() - 1];
            let regex = Regex::new(expr)
                .with_context(|| format!("invalid env variable regex '{entry}'"))?;
            return Ok(Self::Regex(regex));
        }
        Ok(Self::Glob(compile_glob(entry)?))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Glob(pattern) => glob_matches(pattern, name),
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Compiled allow-list, immutable for the whole invocation.
#[derive(Debug, Clone, Default)]
pub struct GiterminismConfig {
    allow_uncommitted_config: bool,
    templates: Vec<Pattern>,
    go_template_files: Vec<Pattern>,
    dockerfiles: Vec<Pattern>,
    dockerignore_files: Vec<Pattern>,
    helm_files: Vec<Pattern>,
    env_variables: Vec<EnvMatcher>,
}

fn compile_all(entries: &[String], option: &str) -> Result<Vec<Pattern>> {
    entries
        .iter()
        .map(|entry| compile_glob(entry).with_context(|| format!("invalid entry in {option}")))
        .collect()
}

impl GiterminismConfig {
    /// Parses and compiles the document.
    pub fn from_yaml(data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let raw: RawGiterminismConfig =
            serde_yaml::from_slice(data).context("unable to parse giterminism config")?;
        Self::compile(&raw)
    }

    /// Compiles an already deserialized document.
    pub fn compile(raw: &RawGiterminismConfig) -> Result<Self> {
        match raw.giterminism_config_version {
            Some(1) | None => {}
            Some(version) => {
                bail!("unsupported giterminismConfigVersion {version}, only 1 is supported")
            }
        }

        let config = &raw.config;
        Ok(Self {
            allow_uncommitted_config: config.allow_uncommitted,
            templates: compile_all(
                &config.allow_uncommitted_templates,
                "config.allowUncommittedTemplates",
            )?,
            go_template_files: compile_all(
                &config.go_template_rendering.allow_uncommitted_files,
                "config.goTemplateRendering.allowUncommittedFiles",
            )?,
            dockerfiles: compile_all(
                &config.dockerfile.allow_uncommitted,
                "config.dockerfile.allowUncommitted",
            )?,
            dockerignore_files: compile_all(
                &config.dockerfile.allow_uncommitted_dockerignore_files,
                "config.dockerfile.allowUncommittedDockerignoreFiles",
            )?,
            helm_files: compile_all(&raw.helm.allow_uncommitted_files, "helm.allowUncommittedFiles")?,
            env_variables: config
                .go_template_rendering
                .allow_env_variables
                .iter()
                .map(|entry| EnvMatcher::parse(entry))
                .collect::<Result<_>>()
                .context("invalid entry in config.goTemplateRendering.allowEnvVariables")?,
        })
    }

    /// `config.allowUncommitted`
    #[must_use]
    pub const fn is_uncommitted_config_accepted(&self) -> bool {
        self.allow_uncommitted_config
    }

    /// Whether an uncommitted `path` of `category` may be read from the working tree.
    #[must_use]
    pub fn is_uncommitted_file_accepted(&self, category: FileCategory, path: &str) -> bool {
        let patterns = match category {
            FileCategory::Config => return self.allow_uncommitted_config,
            FileCategory::GiterminismConfig => return false,
            FileCategory::ConfigTemplate => &self.templates,
            FileCategory::GoTemplateFile => &self.go_template_files,
            FileCategory::Dockerfile => &self.dockerfiles,
            FileCategory::Dockerignore => &self.dockerignore_files,
            FileCategory::HelmFile => &self.helm_files,
        };

        let path = normalize_path_for_storage(path);
        patterns.iter().any(|pattern| path_or_parent_matches(pattern, &path))
    }

    /// Whether the template function `env` may read `name`.
    #[must_use]
    pub fn is_env_accepted(&self, name: &str) -> bool {
        self.env_variables.iter().any(|matcher| matcher.matches(name))
    }
}

fn path_or_parent_matches(pattern: &Pattern, path: &str) -> bool {
    if glob_matches(pattern, path) {
        return true;
    }

    let mut prefix = path;
    while let Some((parent, _)) = prefix.rsplit_once('/') {
        if glob_matches(pattern, parent) {
            return true;
        }
        prefix = parent;
    }
    false
}
