//! Structural and reference errors of the werf config.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::splitter::Document;

/// Placeholder shown when no project name could be suggested.
const PROJECT_PLACEHOLDER: &str = "<project-name>";

/// Two or more directives sharing a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateName {
    pub name: String,
    /// Location of every declaration, in declaration order.
    pub locations: Vec<String>,
}

impl fmt::Display for DuplicateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is declared at {}", display_name(&self.name), self.locations.join(" and "))
    }
}

/// A `fromImage`, `fromArtifact` or `import` pointing at an unknown or wrong-kind name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// `image` or `artifact`
    pub consumer_kind: &'static str,
    pub consumer: String,
    /// The directive holding the reference, e.g. `fromImage`
    pub directive: &'static str,
    pub target: String,
    pub location: String,
    pub hint: Option<String>,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' ({}): {} '{}' is not defined",
            self.consumer_kind,
            display_name(&self.consumer),
            self.location,
            self.directive,
            self.target
        )?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

/// Nameless images are shown as `~`, the way they are written.
#[must_use]
pub fn display_name(name: &str) -> &str {
    if name.is_empty() { "~" } else { name }
}

fn bullet_list<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|item| format!("\n  - {item}")).collect()
}

fn dump_document(doc: &Document) -> String {
    format!("{}:\n\n{}", doc.location(), doc.content_str().trim_end())
}

/// Errors produced while classifying, unmarshaling and validating documents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A problem inside one document; the message already carries absolute line numbers.
    #[error("{message}\n\n{}", dump_document(.doc))]
    InDocument {
        message: String,
        doc: Arc<Document>,
    },

    #[error(
        "meta config section (configVersion and project) is not defined: add the following section to the top of the config, e.g.\n\nconfigVersion: 1\nproject: {}\n---",
        .project.as_deref().unwrap_or(PROJECT_PLACEHOLDER)
    )]
    MetaNotDefined {
        /// Suggested project name derived from the repository or directory
        project: Option<String>,
    },

    #[error("image and artifact names must be unique:{}", bullet_list(.duplicates))]
    DuplicateNames {
        duplicates: Vec<DuplicateName>,
    },

    #[error("unresolved references:{}", bullet_list(.references))]
    UnresolvedReferences {
        references: Vec<UnresolvedReference>,
    },

    #[error("infinite loop detected between images: {}", .chain.join(" → "))]
    CircularDependency {
        /// Names along the cycle; the first name is repeated at the end
        chain: Vec<String>,
    },
}

impl ConfigError {
    pub fn in_document(doc: &Arc<Document>, message: impl Into<String>) -> Self {
        Self::InDocument {
            message: message.into(),
            doc: Arc::clone(doc),
        }
    }

    /// A hint for the CLI.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::InDocument {
                ..
            } => "Fix the section shown above; line numbers refer to the rendered config",
            Self::MetaNotDefined {
                ..
            } => "Add the meta section with configVersion and project as the first document",
            Self::DuplicateNames {
                ..
            } => "Rename the directives so every image and artifact has its own name",
            Self::UnresolvedReferences {
                ..
            } => "Declare the referenced images and artifacts or fix the names",
            Self::CircularDependency {
                ..
            } => "Break the loop by changing one of the fromImage, fromArtifact or import directives",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn doc() -> Arc<Document> {
        Arc::new(Document {
            index: 1,
            line: 4,
            range: 10..20,
            content: b"image: web\nfrom: alpine\n".to_vec(),
            render_file_path: PathBuf::from("werf.yaml"),
        })
    }

    #[test]
    fn test_in_document_dumps_section() {
        let msg = ConfigError::in_document(&doc(), "unknown field `form` at line 6").to_string();
        assert!(msg.starts_with("unknown field `form` at line 6\n\nwerf.yaml:5 (document #2):"));
        assert!(msg.ends_with("image: web\nfrom: alpine"));
    }

    #[test]
    fn test_duplicate_names_lists_every_location() {
        let err = ConfigError::DuplicateNames {
            duplicates: vec![DuplicateName {
                name: "web".to_string(),
                locations: vec!["werf.yaml:3 (document #2)".into(), "werf.yaml:9 (document #3)".into()],
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("'web' is declared at werf.yaml:3 (document #2) and werf.yaml:9"));
    }

    #[test]
    fn test_cycle_message() {
        let err = ConfigError::CircularDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "infinite loop detected between images: a → b → a");
    }

    #[test]
    fn test_meta_not_defined_suggests_project() {
        let err = ConfigError::MetaNotDefined {
            project: Some("demo-app".into()),
        };
        assert!(err.to_string().contains("project: demo-app"));
        let err = ConfigError::MetaNotDefined {
            project: None,
        };
        assert!(err.to_string().contains(PROJECT_PLACEHOLDER));
    }

    #[test]
    fn test_unresolved_reference_display() {
        let reference = UnresolvedReference {
            consumer_kind: "image",
            consumer: String::new(),
            directive: "fromImage",
            target: "base".to_string(),
            location: "werf.yaml:1 (document #1)".to_string(),
            hint: Some("did you mean 'bases'?".to_string()),
        };
        assert_eq!(
            reference.to_string(),
            "image '~' (werf.yaml:1 (document #1)): fromImage 'base' is not defined (did you mean 'bases'?)"
        );
    }
}
