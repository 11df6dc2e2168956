//! The werf config pipeline.
//!
//! ```text
//! werf.yaml + .werf/**/*.tmpl
//!     │  (giterminism-gated reads)
//!     ▼
//! templating ──► rendered YAML stream ──► splitter ──► raw (classify, unmarshal)
//!                                                        │
//!                                                        ▼
//!                                    directives ──► validation ──► WerfConfig
//! ```
//!
//! # Modules
//!
//! - [`splitter`] - `---` boundary detection on raw bytes
//! - [`raw`] - section classification and strict unmarshaling
//! - [`directives`] - final image, artifact and meta types
//! - [`validation`] - whole-config checks and the import index
//! - [`graph`] - dependency graph, cycle detection, build order
//! - [`error`] - [`ConfigError`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use werf_config::config::{WerfConfigOptions, get_werf_config};
//! use werf_config::giterminism::{FileReader, GiterminismManager, GiterminismOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let options = GiterminismOptions { loose: true, ..Default::default() };
//! let manager = GiterminismManager::new(".", None, &options)?;
//! let reader = FileReader::new(Arc::new(manager));
//!
//! let config = get_werf_config(&reader, None, ".werf", &WerfConfigOptions::default())?;
//! for name in config.dependency_order()? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod directives;
pub mod error;
pub mod graph;
pub mod raw;
pub mod splitter;
pub mod validation;

pub use directives::{
    Deploy, Docker, Git, ImageFrom, ImageFromDockerfile, Import, ImportSource, ImportStage, Meta,
    Mount, MountSource, Shell, StageName, StapelImage, StapelImageArtifact, StapelImageBase,
};
pub use error::ConfigError;
pub use splitter::{Document, split_by_docs};
pub use validation::ImportRef;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::WerfError;
use crate::git::{LocalGitRepo, repo_name_from_url};
use crate::giterminism::FileReader;
use crate::templating::TemplateRenderer;
use crate::utils::{normalize_path_for_storage, project_slug};
use graph::ImageGraph;

/// Directory searched for `*.tmpl` fragments when none is given.
pub const DEFAULT_CONFIG_TEMPLATES_DIR: &str = ".werf";

/// Per-invocation options of the config entry points.
#[derive(Debug, Clone, Default)]
pub struct WerfConfigOptions {
    /// Keep the rendered file and log its path.
    pub log_rendered_file_path: bool,
    /// Value of `Env` in templates.
    pub env: String,
}

/// A parsed and validated werf config.
#[derive(Debug)]
pub struct WerfConfig {
    pub meta: Meta,
    pub stapel_images: Vec<StapelImage>,
    pub images_from_dockerfile: Vec<ImageFromDockerfile>,
    pub artifacts: Vec<StapelImageArtifact>,
    /// Imports grouped by the image or artifact they read from.
    pub imports_by_source: BTreeMap<String, Vec<ImportRef>>,
    graph: ImageGraph,
}

impl WerfConfig {
    #[must_use]
    pub fn get_stapel_image(&self, name: &str) -> Option<&StapelImage> {
        self.stapel_images.iter().find(|image| image.base.name == name)
    }

    #[must_use]
    pub fn get_dockerfile_image(&self, name: &str) -> Option<&ImageFromDockerfile> {
        self.images_from_dockerfile.iter().find(|image| image.name == name)
    }

    #[must_use]
    pub fn get_artifact(&self, name: &str) -> Option<&StapelImageArtifact> {
        self.artifacts.iter().find(|artifact| artifact.base.name == name)
    }

    #[must_use]
    pub fn has_image_or_artifact(&self, name: &str) -> bool {
        self.source_document(name).is_some()
    }

    /// Names of stapel and Dockerfile images, artifacts excluded.
    #[must_use]
    pub fn image_names(&self) -> Vec<&str> {
        self.stapel_images
            .iter()
            .map(|image| image.base.name.as_str())
            .chain(self.images_from_dockerfile.iter().map(|image| image.name.as_str()))
            .collect()
    }

    /// Every image and artifact, dependencies before their dependents.
    pub fn dependency_order(&self) -> Result<Vec<String>, ConfigError> {
        self.graph.topological_order()
    }

    /// The section an image or artifact was declared in.
    #[must_use]
    pub fn source_document(&self, name: &str) -> Option<&Arc<Document>> {
        self.get_artifact(name)
            .map(|artifact| &artifact.base.doc)
            .or_else(|| self.get_stapel_image(name).map(|image| &image.base.doc))
            .or_else(|| self.get_dockerfile_image(name).map(|image| &image.doc))
    }

    fn all_names(&self) -> impl Iterator<Item = &str> {
        self.image_names()
            .into_iter()
            .chain(self.artifacts.iter().map(|artifact| artifact.base.name.as_str()))
    }
}

/// Renders the config with its fragments into one YAML stream.
pub fn render_werf_config_yaml(
    reader: &FileReader,
    config_path: Option<&str>,
    templates_dir: &str,
    env: &str,
) -> Result<String> {
    let (config_rel_path, content) = reader.read_config(config_path)?;

    let templates_dir = normalize_path_for_storage(templates_dir);
    let prefix = match templates_dir.trim_end_matches('/') {
        "" | "." => String::new(),
        dir => format!("{dir}/"),
    };
    let fragments: BTreeMap<String, String> = reader
        .config_templates(&templates_dir)?
        .into_iter()
        .map(|(path, data)| {
            let name = path.strip_prefix(&prefix).unwrap_or(&path).to_string();
            (name, String::from_utf8_lossy(&data).into_owned())
        })
        .collect();

    debug!(
        target: "config",
        "Rendering {} with {} template(s) from '{}'",
        config_rel_path,
        fragments.len(),
        templates_dir
    );

    TemplateRenderer::new(reader.clone())
        .render(&String::from_utf8_lossy(&content), &fragments, env)
        .with_context(|| format!("unable to render {config_rel_path}"))
}

/// Splits, classifies and validates an already rendered stream.
///
/// A missing meta section is reported without a project suggestion; see
/// [`get_werf_config`] for the variant that computes one.
pub fn parse_werf_config(rendered: &[u8], render_path: &Path) -> Result<WerfConfig, ConfigError> {
    let docs = split_by_docs(rendered, render_path);
    let raw = raw::split_by_meta_and_raw_images(&docs)?;

    let raw_meta = raw.meta.as_ref().ok_or(ConfigError::MetaNotDefined {
        project: None,
    })?;
    let meta = Meta::from_raw(raw_meta)?;

    validation::assemble(meta, &raw)
}

/// Rendered stream plus the config parsed from it.
fn load_werf_config(
    reader: &FileReader,
    config_path: Option<&str>,
    templates_dir: &str,
    opts: &WerfConfigOptions,
) -> Result<(String, WerfConfig)> {
    let rendered = render_werf_config_yaml(reader, config_path, templates_dir, &opts.env)
        .context("cannot parse config")?;

    let mut render_file = tempfile::Builder::new()
        .prefix("werf-config-render-")
        .suffix(".yaml")
        .tempfile()
        .context("unable to create the werf config render file")?;
    render_file
        .write_all(rendered.as_bytes())
        .with_context(|| format!("unable to write rendered config to {}", render_file.path().display()))?;
    let render_path = render_file.path().to_path_buf();

    let parsed = match parse_werf_config(rendered.as_bytes(), &render_path) {
        Err(ConfigError::MetaNotDefined {
            ..
        }) => {
            let project = get_project_name(reader.project_dir(), reader.manager().repo())
                .context("failed to get default project name")?;
            Err(ConfigError::MetaNotDefined {
                project: Some(project),
            })
        }
        other => other,
    };

    // Errors point into the render file, so it outlives the process then.
    if opts.log_rendered_file_path || parsed.is_err() {
        let path = persist_render_file(render_file)?;
        if opts.log_rendered_file_path {
            info!("Using werf config render file: {}", path.display());
        }
    }

    Ok((rendered, parsed?))
}

fn persist_render_file(file: tempfile::NamedTempFile) -> Result<PathBuf> {
    let (_, path) = file.keep().context("unable to keep the werf config render file")?;
    Ok(path)
}

/// Renders, parses and validates the werf config of the project.
pub fn get_werf_config(
    reader: &FileReader,
    config_path: Option<&str>,
    templates_dir: &str,
    opts: &WerfConfigOptions,
) -> Result<WerfConfig> {
    load_werf_config(reader, config_path, templates_dir, opts).map(|(_, config)| config)
}

/// Output of the render command.
///
/// Without image names this is the whole rendered stream; otherwise the
/// source sections of the named images joined by `---`.
pub fn render_werf_config(
    reader: &FileReader,
    config_path: Option<&str>,
    templates_dir: &str,
    images: &[String],
    opts: &WerfConfigOptions,
) -> Result<String> {
    let (rendered, config) = load_werf_config(reader, config_path, templates_dir, opts)?;
    if images.is_empty() {
        return Ok(rendered);
    }

    let mut sections = Vec::with_capacity(images.len());
    for name in images {
        let doc = config.source_document(name).ok_or_else(|| WerfError::ImageNotDefined {
            name: error::display_name(name).to_string(),
            suggestions: similar_names(name, config.all_names()),
        })?;
        sections.push(doc.content_str().into_owned());
    }
    Ok(sections.join("---\n"))
}

fn similar_names<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut similar: Vec<(usize, &str)> = candidates
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
        .filter(|(distance, _)| *distance <= 3)
        .collect();
    similar.sort_unstable();
    similar.into_iter().take(3).map(|(_, candidate)| candidate.to_string()).collect()
}

/// Project name suggested for a config without a meta section: the `origin`
/// repository name when there is one, the directory name otherwise, slugified.
pub fn get_project_name(project_dir: &Path, repo: Option<&dyn LocalGitRepo>) -> Result<String> {
    if let Some(repo) = repo {
        if let Some(url) = repo.remote_origin_url()? {
            let name = repo_name_from_url(&url)
                .ok_or_else(|| anyhow::anyhow!("bad url '{url}': unable to get the repository name"))?;
            return Ok(project_slug(&name));
        }
    }

    let name = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf())
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(project_slug(&name))
}
