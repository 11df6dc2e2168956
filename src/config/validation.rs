//! Whole-config checks, run in order by [`assemble`]:
//!
//! 1. name uniqueness across images, Dockerfile images and artifacts
//! 2. `fromImage`/`fromArtifact` and `import` source resolution
//! 3. reverse import index (source to consumers)
//! 4. export auto-exclusion
//! 5. cycle detection over base and import edges
//!
//! Reference errors are collected and reported together.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::WerfConfig;
use super::directives::{
    ImageFrom, ImageFromDockerfile, Import, ImportSource, Meta, StapelDirectives, StapelImage,
    StapelImageArtifact, StapelImageBase,
};
use super::error::{ConfigError, DuplicateName, UnresolvedReference, display_name};
use super::graph::ImageGraph;
use super::raw::RawDocuments;
use super::splitter::Document;

/// One import of `source`, as seen from the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub consumer: String,
    pub import: Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Image,
    DockerfileImage,
    Artifact,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Self::Image | Self::DockerfileImage => "image",
            Self::Artifact => "artifact",
        }
    }
}

/// A declared name with its kind and origin.
struct Declaration<'a> {
    kind: Kind,
    name: &'a str,
    doc: &'a Arc<Document>,
}

/// Every declaration of the config in stream order.
fn declarations(config: &WerfConfig) -> Vec<Declaration<'_>> {
    let mut decls: Vec<Declaration<'_>> = config
        .stapel_images
        .iter()
        .map(|image| Declaration {
            kind: Kind::Image,
            name: &image.base.name,
            doc: &image.base.doc,
        })
        .chain(config.images_from_dockerfile.iter().map(|image| Declaration {
            kind: Kind::DockerfileImage,
            name: &image.name,
            doc: &image.doc,
        }))
        .chain(config.artifacts.iter().map(|artifact| Declaration {
            kind: Kind::Artifact,
            name: &artifact.base.name,
            doc: &artifact.base.doc,
        }))
        .collect();
    // Stable: names of one multi-name section keep their order.
    decls.sort_by_key(|decl| decl.doc.index);
    decls
}

fn validate_names(decls: &[Declaration<'_>]) -> Result<(), ConfigError> {
    let mut order: Vec<&str> = Vec::new();
    let mut locations: HashMap<&str, Vec<String>> = HashMap::new();
    for decl in decls {
        let entry = locations.entry(decl.name).or_default();
        if entry.is_empty() {
            order.push(decl.name);
        }
        entry.push(decl.doc.location());
    }

    let duplicates: Vec<DuplicateName> = order
        .into_iter()
        .filter_map(|name| {
            let locs = &locations[name];
            (locs.len() > 1).then(|| DuplicateName {
                name: name.to_string(),
                locations: locs.clone(),
            })
        })
        .collect();
    if !duplicates.is_empty() {
        return Err(ConfigError::DuplicateNames {
            duplicates,
        });
    }

    let images = decls.iter().filter(|d| d.kind != Kind::Artifact).count();
    if let Some(nameless) = decls.iter().find(|d| d.kind != Kind::Artifact && d.name.is_empty()) {
        if images > 1 {
            return Err(ConfigError::in_document(
                nameless.doc,
                "a nameless image (image: ~) cannot be declared together with other images",
            ));
        }
    }

    Ok(())
}

/// Resolves names to kinds and suggests close matches.
struct NameIndex<'a> {
    kinds: HashMap<&'a str, Kind>,
}

impl<'a> NameIndex<'a> {
    fn new(decls: &[Declaration<'a>]) -> Self {
        Self {
            kinds: decls.iter().map(|d| (d.name, d.kind)).collect(),
        }
    }

    fn kind(&self, name: &str) -> Option<Kind> {
        self.kinds.get(name).copied()
    }

    fn suggestion(&self, name: &str) -> Option<String> {
        let mut candidates: Vec<&str> = self
            .kinds
            .keys()
            .copied()
            .filter(|candidate| !candidate.is_empty() && strsim::levenshtein(name, candidate) <= 2)
            .collect();
        candidates.sort_unstable();
        candidates.first().map(|candidate| format!("did you mean '{candidate}'?"))
    }

    /// `None` when `target` is declared with an accepted kind.
    fn check(&self, target: &str, image_expected: bool) -> Option<Option<String>> {
        match (self.kind(target), image_expected) {
            (Some(Kind::Image | Kind::DockerfileImage), true) | (Some(Kind::Artifact), false) => None,
            (Some(Kind::Artifact), true) => {
                Some(Some(format!("'{target}' is an artifact, use fromArtifact or import.artifact")))
            }
            (Some(_), false) => {
                Some(Some(format!("'{target}' is an image, use fromImage or import.image")))
            }
            (None, _) => Some(self.suggestion(target)),
        }
    }
}

fn stapel_bases(config: &WerfConfig) -> Vec<(Kind, &StapelImageBase)> {
    let mut bases: Vec<(Kind, &StapelImageBase)> = config
        .stapel_images
        .iter()
        .map(|image| (Kind::Image, &image.base))
        .chain(config.artifacts.iter().map(|artifact| (Kind::Artifact, &artifact.base)))
        .collect();
    bases.sort_by_key(|(_, base)| base.doc.index);
    bases
}

fn resolve_references(config: &WerfConfig, index: &NameIndex<'_>) -> Result<(), ConfigError> {
    let mut references = Vec::new();

    for (kind, base) in stapel_bases(config) {
        let mut unresolved = |directive: &'static str, target: &str, hint: Option<String>| {
            references.push(UnresolvedReference {
                consumer_kind: kind.label(),
                consumer: base.name.clone(),
                directive,
                target: target.to_string(),
                location: base.doc.location(),
                hint,
            });
        };

        match &base.from {
            ImageFrom::Image(target) => {
                if let Some(hint) = index.check(target, true) {
                    unresolved("fromImage", target, hint);
                }
            }
            ImageFrom::Artifact(target) => {
                if let Some(hint) = index.check(target, false) {
                    unresolved("fromArtifact", target, hint);
                }
            }
            ImageFrom::Base {
                ..
            } => {}
        }

        for import in &base.import {
            let (directive, image_expected) = match import.source {
                ImportSource::Image(_) => ("import.image", true),
                ImportSource::Artifact(_) => ("import.artifact", false),
            };
            if let Some(hint) = index.check(import.source.name(), image_expected) {
                unresolved(directive, import.source.name(), hint);
            }
        }
    }

    if references.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::UnresolvedReferences {
            references,
        })
    }
}

/// Source name to the imports that read from it, consumers in declaration order.
fn associate_imports(config: &WerfConfig) -> BTreeMap<String, Vec<ImportRef>> {
    let mut index: BTreeMap<String, Vec<ImportRef>> = BTreeMap::new();
    for (_, base) in stapel_bases(config) {
        for import in &base.import {
            index.entry(import.source.name().to_string()).or_default().push(ImportRef {
                consumer: base.name.clone(),
                import: import.clone(),
            });
        }
    }
    index
}

fn join_export_path(add: &str, path: &str) -> String {
    let add = add.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() { format!("{add}/") } else { format!("{add}/{path}") }
}

/// Union of every consumer's `excludePaths`, joined to the import's `add`.
#[must_use]
pub fn export_exclusions(consumers: &[ImportRef]) -> Vec<String> {
    consumers
        .iter()
        .flat_map(|import_ref| {
            import_ref
                .import
                .exclude_paths
                .iter()
                .map(|path| join_export_path(&import_ref.import.add, path))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn exports_auto_excluding(config: &mut WerfConfig) {
    for (source, consumers) in &config.imports_by_source {
        let exclusions = export_exclusions(consumers);
        if exclusions.is_empty() {
            continue;
        }
        debug!(target: "config", "auto-excluding {:?} from exports of '{}'", exclusions, display_name(source));

        let target = config
            .stapel_images
            .iter_mut()
            .map(|image| (&image.base.name, &mut image.base.export_exclusions))
            .chain(
                config
                    .artifacts
                    .iter_mut()
                    .map(|artifact| (&artifact.base.name, &mut artifact.base.export_exclusions)),
            )
            .chain(
                config
                    .images_from_dockerfile
                    .iter_mut()
                    .map(|image| (&image.name, &mut image.export_exclusions)),
            )
            .find(|(name, _)| *name == source);
        if let Some((_, slot)) = target {
            *slot = exclusions;
        }
    }
}

fn build_graph(config: &WerfConfig, decls: &[Declaration<'_>]) -> ImageGraph {
    let mut graph = ImageGraph::new();
    for decl in decls {
        graph.add_image(decl.name);
    }
    for (_, base) in stapel_bases(config) {
        for dependency in base.dependencies() {
            graph.add_dependency(&base.name, dependency);
        }
    }
    graph
}

/// Turns classified raw documents into a validated [`WerfConfig`].
pub fn assemble(meta: Meta, raw: &RawDocuments) -> Result<WerfConfig, ConfigError> {
    let mut stapel_images: Vec<StapelImage> = Vec::new();
    let mut artifacts: Vec<StapelImageArtifact> = Vec::new();
    let mut images_from_dockerfile: Vec<ImageFromDockerfile> = Vec::new();

    for raw_image in &raw.images_from_dockerfile {
        images_from_dockerfile.extend(ImageFromDockerfile::from_raw(raw_image)?);
    }
    for raw_image in &raw.stapel_images {
        match StapelDirectives::from_raw(raw_image)? {
            StapelDirectives::Images(images) => stapel_images.extend(images),
            StapelDirectives::Artifact(artifact) => artifacts.push(artifact),
        }
    }

    let mut config = WerfConfig {
        meta,
        stapel_images,
        images_from_dockerfile,
        artifacts,
        imports_by_source: BTreeMap::new(),
        graph: ImageGraph::new(),
    };

    let graph = {
        let decls = declarations(&config);
        validate_names(&decls)?;
        resolve_references(&config, &NameIndex::new(&decls))?;
        build_graph(&config, &decls)
    };

    config.imports_by_source = associate_imports(&config);
    exports_auto_excluding(&mut config);

    graph.detect_cycles()?;
    config.graph = graph;

    debug!(
        target: "config",
        "werf config assembled: {} image(s), {} Dockerfile image(s), {} artifact(s)",
        config.stapel_images.len(),
        config.images_from_dockerfile.len(),
        config.artifacts.len()
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_werf_config;
    use std::path::Path;

    const META: &str = "configVersion: 1\nproject: demo\n---\n";

    fn parse(body: &str) -> Result<WerfConfig, ConfigError> {
        parse_werf_config(format!("{META}{body}").as_bytes(), Path::new("render.yaml"))
    }

    #[test]
    fn test_duplicate_image_names() {
        let err = parse("image: web\nfrom: a\n---\nimage: web\nfrom: b\n").unwrap_err();
        match err {
            ConfigError::DuplicateNames {
                duplicates,
            } => {
                assert_eq!(duplicates.len(), 1);
                assert_eq!(duplicates[0].name, "web");
                assert_eq!(
                    duplicates[0].locations,
                    vec!["render.yaml:4 (document #2)", "render.yaml:7 (document #3)"]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cross_kind_collision() {
        let err = parse("image: web\nfrom: a\n---\nartifact: web\nfrom: b\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateNames { .. }));

        let err = parse("image: web\nfrom: a\n---\nimage: web\ndockerfile: Dockerfile\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateNames { .. }));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        assert!(parse("image: web\nfrom: a\n---\nimage: Web\nfrom: b\n").is_ok());
    }

    #[test]
    fn test_nameless_image_must_be_alone() {
        assert!(parse("image: ~\nfrom: a\n").is_ok());
        assert!(parse("image: ~\nfrom: a\n---\nartifact: x\nfrom: b\n").is_ok());
        let err = parse("image: ~\nfrom: a\n---\nimage: b\nfrom: b\n").unwrap_err();
        assert!(err.to_string().contains("nameless image"));
    }

    #[test]
    fn test_unresolved_references_are_collected() {
        let err = parse(
            "image: a\nfromImage: missing\n---\nimage: b\nfromArtifact: a\n---\nimage: c\nfrom: x\nimport:\n- artifact: nope\n  add: /x\n",
        )
        .unwrap_err();
        match err {
            ConfigError::UnresolvedReferences {
                references,
            } => {
                let targets: Vec<_> =
                    references.iter().map(|r| (r.consumer.as_str(), r.directive, r.target.as_str())).collect();
                assert_eq!(
                    targets,
                    vec![
                        ("a", "fromImage", "missing"),
                        ("b", "fromArtifact", "a"),
                        ("c", "import.artifact", "nope")
                    ]
                );
                assert!(references[1].hint.as_deref().unwrap_or("").contains("is an image"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_from_image_accepts_dockerfile_image() {
        let config =
            parse("image: base\ndockerfile: Dockerfile\n---\nimage: app\nfromImage: base\n").unwrap();
        assert_eq!(config.dependency_order().unwrap(), vec!["base", "app"]);
    }

    #[test]
    fn test_suggestion_for_typo() {
        let err = parse("image: backend\nfrom: a\n---\nimage: app\nfromImage: bakend\n").unwrap_err();
        assert!(err.to_string().contains("did you mean 'backend'?"));
    }

    #[test]
    fn test_cycle_between_images() {
        let err = parse("image: A\nfromImage: B\n---\nimage: B\nfromImage: A\n").unwrap_err();
        assert_eq!(
            err,
            ConfigError::CircularDependency {
                chain: vec!["A".into(), "B".into(), "A".into()]
            }
        );
    }

    #[test]
    fn test_cycle_through_import() {
        let err = parse(
            "image: app\nfromImage: base\n---\nimage: base\nfrom: alpine\nimport:\n- image: app\n  add: /bin\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "infinite loop detected between images: app → base → app");
    }

    #[test]
    fn test_acyclic_chain_is_accepted() {
        assert!(parse("image: A\nfromImage: B\n---\nimage: B\nfrom: alpine\n").is_ok());
    }

    #[test]
    fn test_import_index_and_export_exclusions() {
        let config = parse(
            "artifact: builder\nfrom: golang\n---\nimage: app\nfrom: alpine\nimport:\n- artifact: builder\n  add: /go/bin\n  excludePaths: [tmp, cache/]\n---\nimage: tool\nfrom: alpine\nimport:\n- artifact: builder\n  add: /go/bin/\n  to: /usr/bin\n  excludePaths: [tmp, docs]\n",
        )
        .unwrap();

        let consumers = &config.imports_by_source["builder"];
        let names: Vec<_> = consumers.iter().map(|c| c.consumer.as_str()).collect();
        assert_eq!(names, vec!["app", "tool"]);

        let builder = config.get_artifact("builder").unwrap();
        assert_eq!(
            builder.base.export_exclusions,
            vec!["/go/bin/cache/", "/go/bin/docs", "/go/bin/tmp"]
        );
        assert!(config.get_stapel_image("app").unwrap().base.export_exclusions.is_empty());
    }

    #[test]
    fn test_join_export_path() {
        assert_eq!(join_export_path("/app", "tmp"), "/app/tmp");
        assert_eq!(join_export_path("/", "/tmp"), "/tmp");
        assert_eq!(join_export_path("/app/", ""), "/app/");
    }
}
