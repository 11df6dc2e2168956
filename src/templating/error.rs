//! Template rendering errors.

/// A failure while parsing or rendering the config templates.
///
/// The message is already flattened from Tera's error chain by
/// [`super::renderer::format_tera_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A template or fragment failed to parse.
    Syntax {
        template: String,
        message: String,
    },

    /// Rendering aborted, including errors returned by helper functions.
    Render {
        template: String,
        message: String,
    },

    /// `include`/`tpl` nested deeper than the renderer allows.
    RecursionLimit {
        depth: usize,
    },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::Syntax {
                template,
                message,
            } => write!(f, "unable to parse template '{}': {}", template, message),
            TemplateError::Render {
                template,
                message,
            } => write!(f, "unable to render template '{}': {}", template, message),
            TemplateError::RecursionLimit {
                depth,
            } => write!(
                f,
                "template recursion depth {} exceeded, check include and tpl calls for loops",
                depth
            ),
        }
    }
}

impl std::error::Error for TemplateError {}

impl TemplateError {
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            TemplateError::Syntax {
                ..
            } => "Check the template syntax: {{ expr }} for output, {% ... %} for control flow, {# ... #} for comments",
            TemplateError::Render {
                ..
            } => "Check the arguments of env, include, tpl, files_get and files_glob calls",
            TemplateError::RecursionLimit {
                ..
            } => "Make sure fragments do not include each other in a loop",
        }
    }
}
