//! Renders the werf config template with Tera.
//!
//! The config file is registered as the root template `werfConfig`. Every
//! fragment found under the templates directory is registered under its path
//! relative to that directory, so `.werf/nested/b.tmpl` is included as
//! `nested/b.tmpl`. All templates are added in one batch, which lets fragments
//! reference each other regardless of discovery order.
//!
//! The root data holds `Env`, the environment name passed by the caller.
//! Helper functions are documented in [`super::functions`].

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tera::{Context, Tera, Value};
use tracing::debug;

use super::error::TemplateError;
use super::functions::{
    create_env_function, create_files_get_function, create_files_glob_function,
    create_include_function, create_tpl_function,
};
use crate::giterminism::{FileReader, GiterminismError};

/// Name of the root template.
pub const ROOT_TEMPLATE_NAME: &str = "werfConfig";

/// Maximum nesting of `include` and `tpl` calls.
pub const MAX_RENDER_DEPTH: usize = 32;

const TPL_NAME_PREFIX: &str = "__tpl_";

/// State shared between the renderer and the `include`/`tpl` functions.
///
/// Functions hold a weak reference; the engine is published once every
/// template and function is registered.
#[derive(Default)]
pub(crate) struct EngineState {
    tera: OnceLock<Tera>,
    depth: AtomicUsize,
    tpl_counter: AtomicUsize,
}

/// Decrements the nesting depth when a nested render finishes.
pub(crate) struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EngineState {
    pub(crate) fn tera(&self) -> tera::Result<&Tera> {
        self.tera.get().ok_or_else(|| tera::Error::msg("the template engine is not initialized"))
    }

    pub(crate) fn enter(&self) -> tera::Result<DepthGuard<'_>> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = DepthGuard(&self.depth);
        if depth > MAX_RENDER_DEPTH {
            let err = TemplateError::RecursionLimit {
                depth: MAX_RENDER_DEPTH,
            };
            return Err(tera::Error::chain(err.to_string(), err));
        }
        Ok(guard)
    }

    pub(crate) fn next_tpl_name(&self) -> String {
        format!("{TPL_NAME_PREFIX}{}", self.tpl_counter.fetch_add(1, Ordering::SeqCst))
    }
}

/// Renders the werf config and its fragments.
pub struct TemplateRenderer {
    reader: FileReader,
}

impl TemplateRenderer {
    #[must_use]
    pub fn new(reader: FileReader) -> Self {
        Self {
            reader,
        }
    }

    /// Renders `config` with `fragments` (relative name to content) available
    /// to `include`.
    ///
    /// A policy violation raised by a helper is returned with its
    /// [`GiterminismError`] kind intact, wrapped in a [`TemplateError::Render`]
    /// context naming the call.
    pub fn render(
        &self,
        config: &str,
        fragments: &BTreeMap<String, String>,
        env: &str,
    ) -> Result<String> {
        let state = Arc::new(EngineState::default());
        let root = root_data(env);

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);

        let templates = fragments
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_str()))
            .chain(std::iter::once((ROOT_TEMPLATE_NAME, config)));
        tera.add_raw_templates(templates).map_err(|e| TemplateError::Syntax {
            template: failed_template_name(&e).unwrap_or_else(|| ROOT_TEMPLATE_NAME.to_string()),
            message: format_tera_error(&e),
        })?;

        tera.register_function("env", create_env_function(self.reader.clone()));
        tera.register_function("get_env", create_env_function(self.reader.clone()));
        tera.register_function("files_get", create_files_get_function(self.reader.clone()));
        tera.register_function("files_glob", create_files_glob_function(self.reader.clone()));
        tera.register_function(
            "include",
            create_include_function(Arc::downgrade(&state), root.clone()),
        );
        tera.register_function("tpl", create_tpl_function(Arc::downgrade(&state), root.clone()));

        // Nested renders see the same templates and functions as the root.
        let _ = state.tera.set(tera.clone());

        debug!(
            target: "templating",
            "Rendering {} with {} fragment(s), env '{}'",
            ROOT_TEMPLATE_NAME,
            fragments.len(),
            env
        );

        let context = Context::from_value(root).map_err(|e| TemplateError::Render {
            template: ROOT_TEMPLATE_NAME.to_string(),
            message: format_tera_error(&e),
        })?;

        tera.render(ROOT_TEMPLATE_NAME, &context).map_err(render_error)
    }
}

fn root_data(env: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("Env".to_string(), Value::String(env.to_string()));
    Value::Object(map)
}

/// Recovers typed errors that helpers stored as sources in Tera's chain.
fn render_error(error: tera::Error) -> anyhow::Error {
    use std::error::Error;

    let render = TemplateError::Render {
        template: ROOT_TEMPLATE_NAME.to_string(),
        message: format_tera_error(&error),
    };

    let mut current: Option<&(dyn Error + 'static)> = error.source();
    while let Some(err) = current {
        if let Some(giterminism) = err.downcast_ref::<GiterminismError>() {
            return anyhow::Error::new(giterminism.clone()).context(render);
        }
        if let Some(template) = err.downcast_ref::<TemplateError>() {
            return anyhow::Error::new(template.clone());
        }
        current = err.source();
    }

    anyhow::Error::new(render)
}

/// Name of the template Tera failed to parse, taken from its message.
fn failed_template_name(error: &tera::Error) -> Option<String> {
    use std::error::Error;

    let mut current: Option<&dyn Error> = Some(error);
    while let Some(err) = current {
        let message = err.to_string();
        if let Some(rest) = message.strip_prefix("Failed to parse ") {
            let quote = rest.chars().next().filter(|c| matches!(c, '\'' | '"'))?;
            return rest[1..].split(quote).next().map(str::to_string);
        }
        current = err.source();
    }
    None
}

/// Flattens Tera's error chain into one readable message.
///
/// Internal names of `tpl` templates are replaced, and messages that only
/// repeat the failure kind are dropped.
pub fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut all_messages = vec![error.to_string()];
    let mut current_error: Option<&dyn Error> = error.source();
    while let Some(err) = current_error {
        all_messages.push(err.to_string());
        current_error = err.source();
    }

    let mut messages: Vec<String> = Vec::new();
    for msg in all_messages {
        let cleaned = clean_tpl_names(&msg).trim().to_string();
        if !cleaned.is_empty() && messages.last() != Some(&cleaned) {
            messages.push(cleaned);
        }
    }

    if messages.is_empty() {
        "template error (no details available)".to_string()
    } else {
        messages.join("\n  → ")
    }
}

fn clean_tpl_names(message: &str) -> String {
    let mut cleaned = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find(&format!("'{TPL_NAME_PREFIX}")) {
        cleaned.push_str(&rest[..start]);
        let after = &rest[start + 1 + TPL_NAME_PREFIX.len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if after[digits..].starts_with('\'') {
            cleaned.push_str("tpl template");
            rest = &after[digits + 1..];
        } else {
            cleaned.push('\'');
            rest = &rest[start + 1..];
        }
    }
    cleaned.push_str(rest);
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryGitRepo, TestProject};
    use serial_test::serial;

    fn loose_renderer(project: &TestProject) -> TemplateRenderer {
        TemplateRenderer::new(project.reader(true).unwrap())
    }

    fn fragments(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_renders_env_value() {
        let project = TestProject::new().unwrap();
        let out = loose_renderer(&project)
            .render("project: demo\nenv: {{ Env }}\n", &BTreeMap::new(), "production")
            .unwrap();
        assert_eq!(out, "project: demo\nenv: production\n");
    }

    #[test]
    fn test_include_is_order_independent() {
        let project = TestProject::new().unwrap();
        // "a" includes "b", "b" sorts after it.
        let frags = fragments(&[
            ("a.tmpl", "a[{{ include(name=\"nested/b.tmpl\") }}]"),
            ("nested/b.tmpl", "b:{{ Env }}"),
        ]);
        let out =
            loose_renderer(&project).render("{{ include(name=\"a.tmpl\") }}", &frags, "dev").unwrap();
        assert_eq!(out, "a[b:dev]");
    }

    #[test]
    fn test_include_with_data() {
        let project = TestProject::new().unwrap();
        project.write("name", "web").unwrap();
        let frags = fragments(&[("img.tmpl", "image: {{ name }}"), ("v.tmpl", "[{{ value }}]")]);
        let out = loose_renderer(&project)
            .render(
                "{% set files = files_glob(pattern=\"name\") %}{{ include(name=\"img.tmpl\", data=files) }} {{ include(name=\"v.tmpl\", data=3) }}",
                &frags,
                "",
            )
            .unwrap();
        assert_eq!(out, "image: web [3]");
    }

    #[test]
    fn test_tpl_renders_inline_template() {
        let project = TestProject::new().unwrap();
        let out = loose_renderer(&project)
            .render(
                "{{ tpl(template=\"{{ Env }}-x\") }} {{ tpl(template=\"{{ value }}\", data=\"y\") }}",
                &BTreeMap::new(),
                "stage",
            )
            .unwrap();
        assert_eq!(out, "stage-x y");
    }

    #[test]
    fn test_recursive_include_hits_limit() {
        let project = TestProject::new().unwrap();
        let frags = fragments(&[("loop.tmpl", "{{ include(name=\"loop.tmpl\") }}")]);
        let err = loose_renderer(&project)
            .render("{{ include(name=\"loop.tmpl\") }}", &frags, "")
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<TemplateError>(),
            Some(&TemplateError::RecursionLimit {
                depth: MAX_RENDER_DEPTH
            })
        );
    }

    #[test]
    fn test_syntax_error_names_template() {
        let project = TestProject::new().unwrap();
        let frags = fragments(&[("broken.tmpl", "{% if %}")]);
        let err = loose_renderer(&project).render("ok", &frags, "").unwrap_err();
        match err.downcast_ref::<TemplateError>() {
            Some(TemplateError::Syntax {
                template,
                ..
            }) => assert_eq!(template, "broken.tmpl"),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_files_functions() {
        let project = TestProject::new().unwrap();
        project.write("conf/a.ini", "A").unwrap();
        project.write("conf/b.ini", "B").unwrap();
        let out = loose_renderer(&project)
            .render(
                "{{ files_get(path=\"conf/a.ini\") }}|{% for p, c in files_glob(pattern=\"conf/*.ini\") %}{{ p }}={{ c }};{% endfor %}|{{ files_glob(pattern=\"none/*\") | length }}",
                &BTreeMap::new(),
                "",
            )
            .unwrap();
        assert_eq!(out, "A|conf/a.ini=A;conf/b.ini=B;|0");
    }

    #[test]
    #[serial]
    fn test_env_in_loose_mode() {
        // SAFETY: serialized with other tests touching the environment.
        unsafe { std::env::set_var("WERF_CONFIG_TEST_VAR", "value") };
        let project = TestProject::new().unwrap();
        let out = loose_renderer(&project)
            .render(
                "{{ env(name=\"WERF_CONFIG_TEST_VAR\") }} {{ get_env(name=\"WERF_CONFIG_TEST_UNSET\", default=\"d\") }}",
                &BTreeMap::new(),
                "",
            )
            .unwrap();
        unsafe { std::env::remove_var("WERF_CONFIG_TEST_VAR") };
        assert_eq!(out, "value d");
    }

    #[test]
    fn test_env_rejected_in_strict_mode_keeps_kind() {
        use crate::giterminism::{GiterminismManager, GiterminismOptions};

        let project = TestProject::new().unwrap();
        let repo = MemoryGitRepo::new().with_file("werf.yaml", "project: demo\n");
        let manager = GiterminismManager::new(
            project.path(),
            Some(Arc::new(repo)),
            &GiterminismOptions::default(),
        )
        .unwrap();
        let reader = FileReader::new(Arc::new(manager));

        let err = TemplateRenderer::new(reader)
            .render("{{ env(name=\"HOME\") }}", &BTreeMap::new(), "")
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<GiterminismError>(),
            Some(&GiterminismError::EnvNotAllowed {
                name: "HOME".to_string()
            })
        );
        assert!(matches!(err.downcast_ref::<TemplateError>(), Some(TemplateError::Render { .. })));
    }

    #[test]
    fn test_clean_tpl_names() {
        assert_eq!(clean_tpl_names("Failed to render '__tpl_12'"), "Failed to render tpl template");
        assert_eq!(clean_tpl_names("'__tpl_x' stays"), "'__tpl_x' stays");
        assert_eq!(clean_tpl_names("plain"), "plain");
    }
}
