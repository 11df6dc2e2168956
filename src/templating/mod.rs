//! Tera rendering of the werf config.
//!
//! The config file and the `*.tmpl` fragments of the templates directory are
//! rendered into one YAML stream. See [`functions`] for the helpers templates
//! can call.

pub mod error;
pub mod functions;
pub mod renderer;

pub use error::TemplateError;
pub use renderer::{MAX_RENDER_DEPTH, ROOT_TEMPLATE_NAME, TemplateRenderer, format_tera_error};
