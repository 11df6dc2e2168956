//! Error types for giterminism policy violations and resolver lookups.
//!
//! Each violation names the `werf-giterminism.yaml` option that would suppress
//! it, because the fix differs per category: commit the file, allow the path,
//! or correct the path.

use std::fmt;
use thiserror::Error;

/// Name of the allow-list document in the project root.
pub const GITERMINISM_CONFIG_NAME: &str = "werf-giterminism.yaml";

/// The kinds of files whose reads go through the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    /// `werf.yaml` / `werf.yml` or a custom config path
    Config,
    /// `*.tmpl` fragments in the config templates directory
    ConfigTemplate,
    /// Targets of `files_get` / `files_glob` during rendering
    GoTemplateFile,
    /// Dockerfiles of Dockerfile images
    Dockerfile,
    /// `.dockerignore` files next to Dockerfiles
    Dockerignore,
    /// Chart files, secret values
    HelmFile,
    /// `werf-giterminism.yaml` itself
    GiterminismConfig,
}

impl FileCategory {
    /// The allow-list option that permits uncommitted files of this category.
    #[must_use]
    pub const fn allow_option(self) -> Option<&'static str> {
        match self {
            Self::Config => Some("config.allowUncommitted"),
            Self::ConfigTemplate => Some("config.allowUncommittedTemplates"),
            Self::GoTemplateFile => Some("config.goTemplateRendering.allowUncommittedFiles"),
            Self::Dockerfile => Some("config.dockerfile.allowUncommitted"),
            Self::Dockerignore => Some("config.dockerfile.allowUncommittedDockerignoreFiles"),
            Self::HelmFile => Some("helm.allowUncommittedFiles"),
            Self::GiterminismConfig => None,
        }
    }

    /// What the user can do about an uncommitted file of this category.
    #[must_use]
    pub fn remedy(self) -> String {
        match self.allow_option() {
            Some(option @ "config.allowUncommitted") => format!(
                "commit the changes or set {option} to true in {GITERMINISM_CONFIG_NAME}"
            ),
            Some(option) => format!(
                "commit the changes or add the path to {option} in {GITERMINISM_CONFIG_NAME}"
            ),
            None => "commit the changes".to_string(),
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "werf config",
            Self::ConfigTemplate => "werf config template",
            Self::GoTemplateFile => "file",
            Self::Dockerfile => "dockerfile",
            Self::Dockerignore => "dockerignore file",
            Self::HelmFile => "helm file",
            Self::GiterminismConfig => "giterminism config",
        };
        f.write_str(name)
    }
}

/// Where a lookup was made, used to word not-found errors by mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLocation {
    /// The working tree (loose mode or an allowed path)
    ProjectDirectory,
    /// The head commit of the local repository
    GitRepository,
}

impl fmt::Display for ReadLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectDirectory => f.write_str("project directory"),
            Self::GitRepository => f.write_str("project git repository"),
        }
    }
}

/// A resolver failure that the user can act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GiterminismError {
    #[error("the werf config '{}' not found in the {location}", .paths.join("', '"))]
    ConfigNotFound {
        paths: Vec<String>,
        location: ReadLocation,
    },

    #[error("the {category} '{path}' not found in the {location}")]
    FileNotFound {
        category: FileCategory,
        path: String,
        location: ReadLocation,
    },

    #[error("the untracked {category} '{path}' must be committed ({})", .category.remedy())]
    UntrackedFile {
        category: FileCategory,
        path: String,
    },

    #[error("the {category} '{path}' has uncommitted changes ({})", .category.remedy())]
    UncommittedChanges {
        category: FileCategory,
        path: String,
    },

    #[error(
        "the environment variable '{name}' is not allowed (add it to config.goTemplateRendering.allowEnvVariables in {GITERMINISM_CONFIG_NAME})"
    )]
    EnvNotAllowed {
        name: String,
    },
}

impl GiterminismError {
    /// A short, actionable hint for the CLI.
    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::ConfigNotFound {
                location: ReadLocation::GitRepository,
                ..
            } => "Commit werf.yaml, or use --loose-giterminism to read the project directory".to_string(),
            Self::ConfigNotFound {
                ..
            } => "Create werf.yaml in the project directory or pass --config".to_string(),
            Self::FileNotFound {
                path,
                ..
            } => format!("Check that '{path}' exists and is spelled correctly"),
            Self::UntrackedFile {
                category,
                ..
            }
            | Self::UncommittedChanges {
                category,
                ..
            } => {
                let mut remedy = category.remedy();
                if let Some(first) = remedy.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                remedy
            }
            Self::EnvNotAllowed {
                name,
            } => format!(
                "Add '{name}' (or a matching pattern) to config.goTemplateRendering.allowEnvVariables"
            ),
        }
    }
}
