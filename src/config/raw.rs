//! Raw documents: classification and strict unmarshaling.
//!
//! Each split document is classified by its distinguishing top-level key and
//! unmarshaled into the matching raw shape. Unknown fields and duplicate keys
//! are rejected. Error messages are rewritten so that `line N` refers to the
//! rendered stream, not the document.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::error::ConfigError;
use super::splitter::Document;

static LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"line (\d+)").expect("line regex is valid"));

const UNRECOGNIZED_DOCUMENT: &str = "cannot recognize type of config section (part of YAML stream separated by three hyphens):\n * 'configVersion' required for meta config section;\n * 'dockerfile' required for the Dockerfile image config sections;\n * 'image' required for the image config sections;\n * 'artifact' required for the artifact config sections;";

/// Kind of a config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Meta,
    ImageFromDockerfile,
    Stapel,
}

/// Checked in order; the first rule with a key present wins.
const CLASSIFICATION_RULES: [(&[&str], DocKind); 3] = [
    (&["configVersion"], DocKind::Meta),
    (&["dockerfile"], DocKind::ImageFromDockerfile),
    (&["image", "artifact"], DocKind::Stapel),
];

/// Names given by `image:` or `artifact:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageNames {
    /// `image: ~`
    Nameless,
    Single(String),
    Multiple(Vec<String>),
}

impl ImageNames {
    /// Expanded directive names; a nameless image is the empty name.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Nameless => vec![String::new()],
            Self::Single(name) => vec![name.clone()],
            Self::Multiple(names) => names.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NamesValue {
    One(String),
    Many(Vec<String>),
}

/// Distinguishes `image: ~` from a missing key.
fn present_names<'de, D>(deserializer: D) -> Result<Option<ImageNames>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(match Option::<NamesValue>::deserialize(deserializer)? {
        None => ImageNames::Nameless,
        Some(NamesValue::One(name)) => ImageNames::Single(name),
        Some(NamesValue::Many(names)) => ImageNames::Multiple(names),
    }))
}

/// A command or a list of commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMeta {
    pub config_version: Option<i64>,
    pub project: Option<String>,
    pub deploy: Option<RawDeploy>,
    pub cleanup: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawDeploy {
    pub helm_chart_dir: Option<String>,
    pub helm_release: Option<String>,
    pub helm_release_slug: Option<bool>,
    pub namespace: Option<String>,
    pub namespace_slug: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawStapelImage {
    #[serde(default, deserialize_with = "present_names")]
    pub image: Option<ImageNames>,
    #[serde(default, deserialize_with = "present_names")]
    pub artifact: Option<ImageNames>,
    pub from: Option<String>,
    pub from_latest: Option<bool>,
    pub from_image: Option<String>,
    pub from_artifact: Option<String>,
    pub from_cache_version: Option<String>,
    #[serde(default)]
    pub git: Vec<RawGit>,
    pub shell: Option<RawShell>,
    pub ansible: Option<Value>,
    #[serde(default)]
    pub mount: Vec<RawMount>,
    pub docker: Option<RawDocker>,
    #[serde(default)]
    pub import: Vec<RawImport>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawGit {
    pub url: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub commit: Option<String>,
    pub add: Option<String>,
    pub to: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    pub stage_dependencies: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawShell {
    pub before_install: Option<StringOrList>,
    pub install: Option<StringOrList>,
    pub before_setup: Option<StringOrList>,
    pub setup: Option<StringOrList>,
    pub cache_version: Option<String>,
    pub before_install_cache_version: Option<String>,
    pub install_cache_version: Option<String>,
    pub before_setup_cache_version: Option<String>,
    pub setup_cache_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMount {
    pub from: Option<String>,
    pub from_path: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "UPPERCASE", deny_unknown_fields)]
pub struct RawDocker {
    #[serde(default)]
    pub volume: Vec<String>,
    #[serde(default)]
    pub expose: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
    #[serde(default)]
    pub label: BTreeMap<String, Value>,
    pub entrypoint: Option<StringOrList>,
    pub cmd: Option<StringOrList>,
    pub workdir: Option<String>,
    pub user: Option<String>,
    pub healthcheck: Option<String>,
    pub stopsignal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawImport {
    pub image: Option<String>,
    pub artifact: Option<String>,
    pub add: Option<String>,
    pub to: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawImageFromDockerfile {
    #[serde(default, deserialize_with = "present_names")]
    pub image: Option<ImageNames>,
    pub dockerfile: Option<String>,
    pub context: Option<String>,
    #[serde(default)]
    pub context_add_files: Vec<String>,
    pub target: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    #[serde(default)]
    pub add_host: Vec<String>,
    pub network: Option<String>,
    pub ssh: Option<String>,
}

/// A raw section together with the document it came from.
#[derive(Debug, Clone)]
pub struct RawDoc<T> {
    pub raw: T,
    pub doc: Arc<Document>,
}

/// Every section of the stream, grouped by kind, in stream order.
#[derive(Debug, Default)]
pub struct RawDocuments {
    pub meta: Option<RawDoc<RawMeta>>,
    pub stapel_images: Vec<RawDoc<RawStapelImage>>,
    pub images_from_dockerfile: Vec<RawDoc<RawImageFromDockerfile>>,
}

/// Shifts every `line N` in `message` by the document's start line.
#[must_use]
pub fn translate_line_numbers(message: &str, doc: &Document) -> String {
    LINE_RE
        .replace_all(message, |caps: &regex::Captures<'_>| match caps[1].parse::<usize>() {
            Ok(line) => format!("line {}", line + doc.line),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

fn unmarshal_error(err: &serde_yaml::Error, doc: &Arc<Document>) -> ConfigError {
    ConfigError::in_document(doc, translate_line_numbers(&err.to_string(), doc))
}

/// Strict unmarshal of one document into `T`.
pub fn unmarshal<T>(doc: &Arc<Document>) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_yaml::from_slice(&doc.content).map_err(|e| unmarshal_error(&e, doc))
}

/// Decides the kind of `doc` from its top-level keys.
pub fn classify(doc: &Arc<Document>) -> Result<DocKind, ConfigError> {
    let mapping: Mapping = unmarshal(doc)?;

    CLASSIFICATION_RULES
        .iter()
        .find(|(keys, _)| keys.iter().any(|key| mapping.contains_key(*key)))
        .map(|(_, kind)| *kind)
        .ok_or_else(|| ConfigError::in_document(doc, UNRECOGNIZED_DOCUMENT))
}

/// Classifies and unmarshals every document.
pub fn split_by_meta_and_raw_images(docs: &[Arc<Document>]) -> Result<RawDocuments, ConfigError> {
    let mut result = RawDocuments::default();

    for doc in docs {
        let kind = classify(doc)?;
        debug!(target: "config", "{} classified as {:?}", doc.location(), kind);

        match kind {
            DocKind::Meta => {
                if result.meta.is_some() {
                    return Err(ConfigError::in_document(
                        doc,
                        "duplicate meta config section definition",
                    ));
                }
                result.meta = Some(RawDoc {
                    raw: unmarshal(doc)?,
                    doc: Arc::clone(doc),
                });
            }
            DocKind::ImageFromDockerfile => result.images_from_dockerfile.push(RawDoc {
                raw: unmarshal(doc)?,
                doc: Arc::clone(doc),
            }),
            DocKind::Stapel => result.stapel_images.push(RawDoc {
                raw: unmarshal(doc)?,
                doc: Arc::clone(doc),
            }),
        }
    }

    Ok(result)
}
