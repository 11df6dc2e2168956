//! Error handling for werf-config
//!
//! Two layers, as in any CLI of this shape:
//!
//! - Strongly-typed errors for code: [`WerfError`] at the top, wrapping the
//!   module errors [`GiterminismError`], [`ConfigError`] and [`TemplateError`].
//! - [`ErrorContext`] for users: the error plus optional details and an
//!   actionable suggestion, printed with colors by the CLI.
//!
//! Library functions return `anyhow::Result` and add context at module
//! boundaries. Typed errors stay reachable through the chain, and
//! [`user_friendly_error`] walks it to find the most specific one.
//!
//! # Examples
//!
//! ```rust,no_run
//! use werf_config::core::{ErrorContext, WerfError, user_friendly_error};
//!
//! fn run() -> anyhow::Result<()> {
//!     Err(WerfError::GitNotFound.into())
//! }
//!
//! if let Err(e) = run() {
//!     user_friendly_error(e).display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::giterminism::GiterminismError;
use crate::templating::TemplateError;

/// The main error type for werf-config operations.
#[derive(Error, Debug, Clone)]
pub enum WerfError {
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        operation: String,
        stderr: String,
    },

    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    #[error("file access failed: {message}")]
    FileAccess {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("specified image {name} is not defined in werf.yaml")]
    ImageNotDefined {
        name: String,
        suggestions: Vec<String>,
    },

    #[error(transparent)]
    Giterminism(#[from] GiterminismError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("{message}")]
    Other {
        message: String,
    },
}

/// An error with user-facing details and a suggestion.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: WerfError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: WerfError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Context added above the typed error, outermost first, or `None` when the
/// typed error is the whole story.
fn outer_context(error: &anyhow::Error, typed: &str) -> Option<String> {
    let outer: Vec<String> = error
        .chain()
        .map(ToString::to_string)
        .take_while(|message| message != typed)
        .collect();
    if outer.is_empty() { None } else { Some(outer.join(": ")) }
}

/// Converts any error into an [`ErrorContext`] with a suggestion.
///
/// The chain is searched for the most specific typed error: giterminism
/// violations and config errors first, then template and crate errors, then
/// I/O errors anywhere in the chain. Context added on top of the typed error
/// becomes the details.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(giterminism) = cause.downcast_ref::<GiterminismError>() {
            let mut ctx = ErrorContext::new(WerfError::Giterminism(giterminism.clone()))
                .with_suggestion(giterminism.suggestion());
            if let Some(details) = outer_context(&error, &giterminism.to_string()) {
                ctx = ctx.with_details(details);
            }
            return ctx;
        }

        if let Some(config) = cause.downcast_ref::<ConfigError>() {
            let mut ctx = ErrorContext::new(WerfError::Config(config.clone()))
                .with_suggestion(config.suggestion());
            if let Some(details) = outer_context(&error, &config.to_string()) {
                ctx = ctx.with_details(details);
            }
            return ctx;
        }
    }

    for cause in error.chain() {
        if let Some(template) = cause.downcast_ref::<TemplateError>() {
            return ErrorContext::new(WerfError::Template(template.clone()))
                .with_suggestion(template.suggestion());
        }

        if let Some(werf_error) = cause.downcast_ref::<WerfError>() {
            let mut ctx = create_error_context(werf_error.clone());
            if ctx.details.is_none() {
                if let Some(details) = outer_context(&error, &werf_error.to_string()) {
                    ctx = ctx.with_details(details);
                }
            }
            return ctx;
        }
    }

    if let Some(io_error) = error.chain().find_map(|cause| cause.downcast_ref::<std::io::Error>()) {
        let suggestion = match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Some("Check the file ownership and permissions in the project directory")
            }
            std::io::ErrorKind::NotFound => Some("Check that the file or directory exists and the path is correct"),
            _ => None,
        };
        if let Some(suggestion) = suggestion {
            let mut ctx = ErrorContext::new(WerfError::FileAccess {
                kind: io_error.kind(),
                message: io_error.to_string(),
            })
            .with_suggestion(suggestion);
            if let Some(details) = outer_context(&error, &io_error.to_string()) {
                ctx = ctx.with_details(details);
            }
            return ctx;
        }
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(WerfError::Other {
        message,
    })
}

fn create_error_context(error: WerfError) -> ErrorContext {
    match &error {
        WerfError::GitNotFound => ErrorContext::new(WerfError::GitNotFound)
            .with_suggestion("Install git from https://git-scm.com/ or your package manager, or use --loose-giterminism")
            .with_details("Reading the config from the head commit requires git in PATH"),

        WerfError::GitCommandError {
            operation,
            stderr,
        } => ErrorContext::new(error.clone())
            .with_suggestion(match operation.as_str() {
                "rev-parse" => "Make sure the project has at least one commit, or use --loose-giterminism",
                "cat-file" | "ls-tree" => "Check that the path is committed at the head commit",
                _ => "Try running the git command manually for more details",
            })
            .with_details(stderr.clone()),

        WerfError::ImageNotDefined {
            suggestions,
            ..
        } if !suggestions.is_empty() => ErrorContext::new(error.clone())
            .with_suggestion(format!("Did you mean {}?", suggestions.join(", "))),

        WerfError::ImageNotDefined {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Run 'werf-config render' without image names to list the rendered config"),

        WerfError::Giterminism(e) => ErrorContext::new(error.clone()).with_suggestion(e.suggestion()),

        WerfError::Config(e) => ErrorContext::new(error.clone()).with_suggestion(e.suggestion()),

        WerfError::Template(e) => ErrorContext::new(error.clone()).with_suggestion(e.suggestion()),

        _ => ErrorContext::new(error.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::giterminism::FileCategory;
    use anyhow::Context;

    #[test]
    fn test_error_display() {
        let error = WerfError::GitNotFound;
        assert_eq!(error.to_string(), "Git is not installed or not found in PATH");

        let error = WerfError::ImageNotDefined {
            name: "web".to_string(),
            suggestions: vec![],
        };
        assert_eq!(error.to_string(), "specified image web is not defined in werf.yaml");
    }

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new(WerfError::GitNotFound)
            .with_suggestion("Install git")
            .with_details("git is required");

        let display = format!("{ctx}");
        assert!(display.contains("Git is not installed or not found in PATH"));
        assert!(display.contains("Details: git is required"));
        assert!(display.contains("Suggestion: Install git"));
    }

    #[test]
    fn test_user_friendly_error_finds_giterminism_error_under_context() {
        let err = anyhow::Error::from(GiterminismError::UncommittedChanges {
            category: FileCategory::GoTemplateFile,
            path: "conf/app.ini".to_string(),
        })
        .context("files_get('conf/app.ini')")
        .context("unable to render werf config");

        let ctx = user_friendly_error(err);
        assert!(matches!(ctx.error, WerfError::Giterminism(GiterminismError::UncommittedChanges { .. })));
        assert!(ctx.suggestion.unwrap().contains("config.goTemplateRendering.allowUncommittedFiles"));
        assert_eq!(
            ctx.details.unwrap(),
            "unable to render werf config: files_get('conf/app.ini')"
        );
    }

    #[test]
    fn test_user_friendly_error_config_error() {
        let err: anyhow::Error = ConfigError::CircularDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        let ctx = user_friendly_error(err);
        assert!(matches!(ctx.error, WerfError::Config(ConfigError::CircularDependency { .. })));
        assert!(ctx.details.is_none());
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_user_friendly_error_git_command() {
        let err: anyhow::Error = WerfError::GitCommandError {
            operation: "rev-parse".to_string(),
            stderr: "fatal: Needed a single revision".to_string(),
        }
        .into();
        let ctx = user_friendly_error(err);
        assert!(ctx.suggestion.unwrap().contains("at least one commit"));
        assert_eq!(ctx.details.unwrap(), "fatal: Needed a single revision");
    }

    #[test]
    fn test_user_friendly_error_permission_denied() {
        use std::io::{Error, ErrorKind};

        let err = anyhow::Error::from(Error::new(ErrorKind::PermissionDenied, "denied"))
            .context("unable to walk /project/conf");
        let ctx = user_friendly_error(err);
        assert!(matches!(
            ctx.error,
            WerfError::FileAccess {
                kind: ErrorKind::PermissionDenied,
                ..
            }
        ));
        assert_eq!(ctx.details.unwrap(), "unable to walk /project/conf");
        assert!(ctx.suggestion.unwrap().contains("permissions"));
    }

    #[test]
    fn test_user_friendly_error_generic_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("root cause"))
            .context("outer")
            .unwrap_err();
        let ctx = user_friendly_error(err);
        let message = ctx.error.to_string();
        assert!(message.starts_with("outer"));
        assert!(message.contains("1: root cause"));
    }

    #[test]
    fn test_image_not_defined_suggestions() {
        let ctx = create_error_context(WerfError::ImageNotDefined {
            name: "bakend".to_string(),
            suggestions: vec!["backend".to_string()],
        });
        assert_eq!(ctx.suggestion.unwrap(), "Did you mean backend?");
    }
}
