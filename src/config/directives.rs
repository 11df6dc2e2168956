//! Final config directives built from raw sections.
//!
//! Conversion checks everything that can be decided from one section alone:
//! base selection, import shape, absolute paths, meta values. Checks that need
//! the whole config live in `validation`.

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::ConfigError;
use super::raw::{
    ImageNames, RawDeploy, RawDoc, RawDocker, RawGit, RawImageFromDockerfile, RawImport, RawMeta,
    RawMount, RawShell, RawStapelImage, StringOrList,
};
use super::splitter::Document;
use crate::giterminism::FileReader;
use crate::utils::is_valid_project_name;
use crate::utils::slug::MAX_PROJECT_NAME_LENGTH;

/// The only supported `configVersion`.
pub const CONFIG_VERSION: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub config_version: i64,
    pub project: String,
    pub deploy: Deploy,
    /// Passed through to the cleanup subsystem as is.
    pub cleanup: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deploy {
    pub helm_chart_dir: Option<String>,
    pub helm_release: Option<String>,
    pub helm_release_slug: bool,
    pub namespace: Option<String>,
    pub namespace_slug: bool,
}

impl Default for Deploy {
    fn default() -> Self {
        Self {
            helm_chart_dir: None,
            helm_release: None,
            helm_release_slug: true,
            namespace: None,
            namespace_slug: true,
        }
    }
}

/// Where a stapel image or artifact starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFrom {
    /// A registry reference (`from`).
    Base {
        image: String,
        latest: bool,
        cache_version: Option<String>,
    },
    /// `fromImage`
    Image(String),
    /// `fromArtifact`
    Artifact(String),
}

impl ImageFrom {
    /// Name of the directive this base depends on, if any.
    #[must_use]
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::Base {
                ..
            } => None,
            Self::Image(name) | Self::Artifact(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Git {
    /// `None` for the project repository itself.
    pub url: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub commit: Option<String>,
    pub add: String,
    pub to: String,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub stage_dependencies: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shell {
    pub before_install: Vec<String>,
    pub install: Vec<String>,
    pub before_setup: Vec<String>,
    pub setup: Vec<String>,
    pub cache_version: Option<String>,
    pub before_install_cache_version: Option<String>,
    pub install_cache_version: Option<String>,
    pub before_setup_cache_version: Option<String>,
    pub setup_cache_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    TmpDir,
    BuildDir,
    Path(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub from: MountSource,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Docker {
    pub volume: Vec<String>,
    pub expose: Vec<String>,
    pub env: BTreeMap<String, Value>,
    pub label: BTreeMap<String, Value>,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub workdir: Option<String>,
    pub user: Option<String>,
    pub healthcheck: Option<String>,
    pub stopsignal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportSource {
    Image(String),
    Artifact(String),
}

impl ImportSource {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Image(name) | Self::Artifact(name) => name,
        }
    }

    #[must_use]
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Artifact(_) => "artifact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageName {
    Install,
    Setup,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Setup => write!(f, "setup"),
        }
    }
}

/// When an import is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Before(StageName),
    After(StageName),
}

impl Default for ImportStage {
    fn default() -> Self {
        Self::After(StageName::Setup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub source: ImportSource,
    pub add: String,
    pub to: String,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub stage: ImportStage,
}

/// Everything stapel images and artifacts have in common.
#[derive(Debug, Clone, PartialEq)]
pub struct StapelImageBase {
    /// Empty for the nameless image.
    pub name: String,
    pub from: ImageFrom,
    pub git: Vec<Git>,
    pub shell: Option<Shell>,
    pub ansible: Option<Value>,
    pub mount: Vec<Mount>,
    pub import: Vec<Import>,
    /// Paths consumers exclude from their imports, joined to the import's
    /// `add` and merged over all consumers; sorted.
    pub export_exclusions: Vec<String>,
    pub doc: Arc<Document>,
}

impl StapelImageBase {
    /// Names this directive needs built first.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.from.dependency().into_iter().chain(self.import.iter().map(|i| i.source.name()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StapelImage {
    pub base: StapelImageBase,
    pub docker: Option<Docker>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StapelImageArtifact {
    pub base: StapelImageBase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageFromDockerfile {
    pub name: String,
    pub dockerfile: String,
    pub context: Option<String>,
    pub context_add_files: Vec<String>,
    pub target: Option<String>,
    pub args: BTreeMap<String, Value>,
    pub add_host: Vec<String>,
    pub network: Option<String>,
    pub ssh: Option<String>,
    pub export_exclusions: Vec<String>,
    pub doc: Arc<Document>,
}

/// What one stapel section expands to.
#[derive(Debug)]
pub enum StapelDirectives {
    Images(Vec<StapelImage>),
    Artifact(StapelImageArtifact),
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

fn require_absolute(
    doc: &Arc<Document>,
    directive: &str,
    field: &str,
    path: &str,
) -> Result<(), ConfigError> {
    if is_absolute(path) {
        Ok(())
    } else {
        Err(ConfigError::in_document(
            doc,
            format!("{directive}: '{field}: {path}' must be an absolute path"),
        ))
    }
}

fn list(value: Option<StringOrList>) -> Vec<String> {
    value.map(StringOrList::into_vec).unwrap_or_default()
}

impl Meta {
    pub fn from_raw(raw: &RawDoc<RawMeta>) -> Result<Self, ConfigError> {
        let doc = &raw.doc;
        let meta = &raw.raw;

        match meta.config_version {
            Some(CONFIG_VERSION) => {}
            Some(version) => {
                return Err(ConfigError::in_document(
                    doc,
                    format!("configVersion {version} is not supported, expected {CONFIG_VERSION}"),
                ));
            }
            None => {
                return Err(ConfigError::in_document(doc, "configVersion must be set to 1"));
            }
        }

        let project = match meta.project.as_deref() {
            None | Some("") => {
                return Err(ConfigError::in_document(doc, "project name is required"));
            }
            Some(project) if !is_valid_project_name(project) => {
                return Err(ConfigError::in_document(
                    doc,
                    format!(
                        "bad project name '{project}': it must match ^[a-z0-9]+(-[a-z0-9]+)*$ and be at most {MAX_PROJECT_NAME_LENGTH} characters long"
                    ),
                ));
            }
            Some(project) => project.to_string(),
        };

        Ok(Self {
            config_version: CONFIG_VERSION,
            project,
            deploy: meta.deploy.clone().map(Deploy::from_raw).unwrap_or_default(),
            cleanup: meta.cleanup.clone(),
        })
    }
}

impl Deploy {
    fn from_raw(raw: RawDeploy) -> Self {
        let defaults = Self::default();
        Self {
            helm_chart_dir: raw.helm_chart_dir,
            helm_release: raw.helm_release,
            helm_release_slug: raw.helm_release_slug.unwrap_or(defaults.helm_release_slug),
            namespace: raw.namespace,
            namespace_slug: raw.namespace_slug.unwrap_or(defaults.namespace_slug),
        }
    }
}

fn image_from(raw: &RawStapelImage, doc: &Arc<Document>) -> Result<ImageFrom, ConfigError> {
    let declared: Vec<&str> = [
        raw.from.as_ref().map(|_| "from"),
        raw.from_image.as_ref().map(|_| "fromImage"),
        raw.from_artifact.as_ref().map(|_| "fromArtifact"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if declared.len() > 1 {
        return Err(ConfigError::in_document(
            doc,
            format!("cannot use {} together, specify exactly one base", declared.join(", ")),
        ));
    }

    if raw.from.is_none() {
        if raw.from_latest.is_some() {
            return Err(ConfigError::in_document(doc, "fromLatest can only be used with from"));
        }
        if raw.from_cache_version.is_some() {
            return Err(ConfigError::in_document(doc, "fromCacheVersion can only be used with from"));
        }
    }

    if let Some(image) = &raw.from {
        if image.is_empty() {
            return Err(ConfigError::in_document(doc, "from cannot be empty"));
        }
        return Ok(ImageFrom::Base {
            image: image.clone(),
            latest: raw.from_latest.unwrap_or(false),
            cache_version: raw.from_cache_version.clone(),
        });
    }
    if let Some(name) = &raw.from_image {
        return Ok(ImageFrom::Image(name.clone()));
    }
    if let Some(name) = &raw.from_artifact {
        return Ok(ImageFrom::Artifact(name.clone()));
    }

    Err(ConfigError::in_document(doc, "one of from, fromImage or fromArtifact is required"))
}

fn git_from_raw(raw: &RawGit, doc: &Arc<Document>) -> Result<Git, ConfigError> {
    let to = raw
        .to
        .clone()
        .ok_or_else(|| ConfigError::in_document(doc, "git: 'to' is required"))?;
    require_absolute(doc, "git", "to", &to)?;
    let add = raw.add.clone().unwrap_or_else(|| "/".to_string());
    require_absolute(doc, "git", "add", &add)?;

    if raw.url.is_none() && (raw.branch.is_some() || raw.tag.is_some() || raw.commit.is_some()) {
        return Err(ConfigError::in_document(
            doc,
            "git: branch, tag and commit are only allowed for remote repositories (with url)",
        ));
    }
    let refs = [&raw.branch, &raw.tag, &raw.commit].iter().filter(|r| r.is_some()).count();
    if refs > 1 {
        return Err(ConfigError::in_document(doc, "git: specify only one of branch, tag or commit"));
    }

    Ok(Git {
        url: raw.url.clone(),
        branch: raw.branch.clone(),
        tag: raw.tag.clone(),
        commit: raw.commit.clone(),
        add,
        to,
        owner: raw.owner.clone(),
        group: raw.group.clone(),
        include_paths: raw.include_paths.clone(),
        exclude_paths: raw.exclude_paths.clone(),
        stage_dependencies: raw.stage_dependencies.clone(),
    })
}

fn shell_from_raw(raw: RawShell) -> Shell {
    Shell {
        before_install: list(raw.before_install),
        install: list(raw.install),
        before_setup: list(raw.before_setup),
        setup: list(raw.setup),
        cache_version: raw.cache_version,
        before_install_cache_version: raw.before_install_cache_version,
        install_cache_version: raw.install_cache_version,
        before_setup_cache_version: raw.before_setup_cache_version,
        setup_cache_version: raw.setup_cache_version,
    }
}

fn mount_from_raw(raw: &RawMount, doc: &Arc<Document>) -> Result<Mount, ConfigError> {
    let to = raw.to.clone().ok_or_else(|| ConfigError::in_document(doc, "mount: 'to' is required"))?;
    require_absolute(doc, "mount", "to", &to)?;

    let from = match (raw.from.as_deref(), raw.from_path.as_deref()) {
        (Some("tmp_dir"), None) => MountSource::TmpDir,
        (Some("build_dir"), None) => MountSource::BuildDir,
        (Some(other), None) => {
            return Err(ConfigError::in_document(
                doc,
                format!("mount: 'from: {other}' is not supported, use tmp_dir or build_dir"),
            ));
        }
        (None, Some(path)) => {
            require_absolute(doc, "mount", "fromPath", path)?;
            MountSource::Path(path.to_string())
        }
        (Some(_), Some(_)) => {
            return Err(ConfigError::in_document(doc, "mount: cannot use from and fromPath together"));
        }
        (None, None) => {
            return Err(ConfigError::in_document(doc, "mount: one of from or fromPath is required"));
        }
    };

    Ok(Mount {
        from,
        to,
    })
}

fn docker_from_raw(raw: RawDocker) -> Docker {
    Docker {
        volume: raw.volume,
        expose: raw.expose,
        env: raw.env,
        label: raw.label,
        entrypoint: list(raw.entrypoint),
        cmd: list(raw.cmd),
        workdir: raw.workdir,
        user: raw.user,
        healthcheck: raw.healthcheck,
        stopsignal: raw.stopsignal,
    }
}

fn stage_name(doc: &Arc<Document>, field: &str, value: &str) -> Result<StageName, ConfigError> {
    match value {
        "install" => Ok(StageName::Install),
        "setup" => Ok(StageName::Setup),
        other => Err(ConfigError::in_document(
            doc,
            format!("import: '{field}: {other}' is not supported, use install or setup"),
        )),
    }
}

fn import_from_raw(raw: &RawImport, doc: &Arc<Document>) -> Result<Import, ConfigError> {
    let source = match (&raw.image, &raw.artifact) {
        (Some(image), None) => ImportSource::Image(image.clone()),
        (None, Some(artifact)) => ImportSource::Artifact(artifact.clone()),
        (Some(_), Some(_)) => {
            return Err(ConfigError::in_document(doc, "import: cannot use image and artifact together"));
        }
        (None, None) => {
            return Err(ConfigError::in_document(doc, "import: one of image or artifact is required"));
        }
    };

    let add = raw.add.clone().ok_or_else(|| ConfigError::in_document(doc, "import: 'add' is required"))?;
    require_absolute(doc, "import", "add", &add)?;
    let to = raw.to.clone().unwrap_or_else(|| add.clone());
    require_absolute(doc, "import", "to", &to)?;

    let stage = match (&raw.before, &raw.after) {
        (Some(before), None) => ImportStage::Before(stage_name(doc, "before", before)?),
        (None, Some(after)) => ImportStage::After(stage_name(doc, "after", after)?),
        (None, None) => ImportStage::default(),
        (Some(_), Some(_)) => {
            return Err(ConfigError::in_document(doc, "import: cannot use before and after together"));
        }
    };

    Ok(Import {
        source,
        add,
        to,
        include_paths: raw.include_paths.clone(),
        exclude_paths: raw.exclude_paths.clone(),
        owner: raw.owner.clone(),
        group: raw.group.clone(),
        stage,
    })
}

fn stapel_base(name: String, raw: &RawStapelImage, doc: &Arc<Document>) -> Result<StapelImageBase, ConfigError> {
    Ok(StapelImageBase {
        name,
        from: image_from(raw, doc)?,
        git: raw.git.iter().map(|git| git_from_raw(git, doc)).collect::<Result<_, _>>()?,
        shell: raw.shell.clone().map(shell_from_raw),
        ansible: raw.ansible.clone(),
        mount: raw.mount.iter().map(|mount| mount_from_raw(mount, doc)).collect::<Result<_, _>>()?,
        import: raw.import.iter().map(|import| import_from_raw(import, doc)).collect::<Result<_, _>>()?,
        export_exclusions: Vec::new(),
        doc: Arc::clone(doc),
    })
}

impl StapelDirectives {
    /// Expands a stapel section into one image per name, or into an artifact.
    pub fn from_raw(raw: &RawDoc<RawStapelImage>) -> Result<Self, ConfigError> {
        let doc = &raw.doc;
        let image = &raw.raw;

        match (&image.image, &image.artifact) {
            (Some(_), Some(_)) => Err(ConfigError::in_document(
                doc,
                "'image' and 'artifact' cannot be used in the same config section",
            )),
            (Some(names), None) => {
                let names = match names {
                    ImageNames::Multiple(list) if list.is_empty() => {
                        return Err(ConfigError::in_document(doc, "image name list cannot be empty"));
                    }
                    ImageNames::Multiple(list) if list.iter().any(String::is_empty) => {
                        return Err(ConfigError::in_document(
                            doc,
                            "image names in a list cannot be empty",
                        ));
                    }
                    names => names.names(),
                };
                let docker = image.docker.clone().map(docker_from_raw);
                names
                    .into_iter()
                    .map(|name| {
                        Ok(StapelImage {
                            base: stapel_base(name, image, doc)?,
                            docker: docker.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::Images)
            }
            (None, Some(names)) => {
                let name = match names {
                    ImageNames::Single(name) if !name.is_empty() => name.clone(),
                    ImageNames::Multiple(_) => {
                        return Err(ConfigError::in_document(doc, "artifact must have a single name"));
                    }
                    _ => return Err(ConfigError::in_document(doc, "artifact name cannot be empty")),
                };
                if image.docker.is_some() {
                    return Err(ConfigError::in_document(
                        doc,
                        "docker directive is not supported for artifacts",
                    ));
                }
                Ok(Self::Artifact(StapelImageArtifact {
                    base: stapel_base(name, image, doc)?,
                }))
            }
            (None, None) => Err(ConfigError::in_document(doc, "'image' or 'artifact' is required")),
        }
    }
}

impl ImageFromDockerfile {
    /// One directive per image name of the section.
    pub fn from_raw(raw: &RawDoc<RawImageFromDockerfile>) -> Result<Vec<Self>, ConfigError> {
        let doc = &raw.doc;
        let image = &raw.raw;

        let dockerfile = match image.dockerfile.as_deref() {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => return Err(ConfigError::in_document(doc, "dockerfile path cannot be empty")),
        };

        let names = match &image.image {
            None => {
                return Err(ConfigError::in_document(
                    doc,
                    "'image' is required for the Dockerfile image config sections",
                ));
            }
            Some(ImageNames::Multiple(list)) if list.is_empty() || list.iter().any(String::is_empty) => {
                return Err(ConfigError::in_document(doc, "image names in a list cannot be empty"));
            }
            Some(names) => names.names(),
        };

        Ok(names
            .into_iter()
            .map(|name| Self {
                name,
                dockerfile: dockerfile.clone(),
                context: image.context.clone(),
                context_add_files: image.context_add_files.clone(),
                target: image.target.clone(),
                args: image.args.clone(),
                add_host: image.add_host.clone(),
                network: image.network.clone(),
                ssh: image.ssh.clone(),
                export_exclusions: Vec::new(),
                doc: Arc::clone(doc),
            })
            .collect())
    }

    fn context_path(&self, name: &str) -> String {
        match self.context.as_deref().map(|context| context.trim_matches('/')) {
            None | Some("" | ".") => name.to_string(),
            Some(context) => format!("{context}/{name}"),
        }
    }

    /// Project-relative path of the Dockerfile: `dockerfile` inside `context`.
    #[must_use]
    pub fn dockerfile_rel_path(&self) -> String {
        self.context_path(&self.dockerfile)
    }

    #[must_use]
    pub fn dockerignore_rel_path(&self) -> String {
        self.context_path(".dockerignore")
    }

    /// Reads the Dockerfile through the resolver.
    pub fn read_dockerfile(&self, reader: &FileReader) -> anyhow::Result<Vec<u8>> {
        reader.read_dockerfile(&self.dockerfile_rel_path())
    }

    /// Reads `.dockerignore` of the context, if there is one in the commit or
    /// the working tree.
    pub fn read_dockerignore(&self, reader: &FileReader) -> anyhow::Result<Option<Vec<u8>>> {
        let rel_path = self.dockerignore_rel_path();
        if !reader.is_dockerignore_exist_anywhere(&rel_path)? {
            return Ok(None);
        }
        reader.read_dockerignore(&rel_path).map(Some)
    }
}
