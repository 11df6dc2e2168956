//! Template functions available in werf config templates.
//!
//! | Function | Arguments | Result |
//! |---|---|---|
//! | `env` / `get_env` | `name`, optional `default` | environment variable, gated by giterminism |
//! | `files_get` | `path` | file content |
//! | `files_glob` | `pattern` | map of path to content, empty when nothing matches |
//! | `include` | `name`, optional `data` | rendered fragment |
//! | `tpl` | `template`, optional `data` | rendered inline template |
//!
//! File and environment access goes through the [`FileReader`], so every call
//! obeys the same policy as the config file itself. Helpers never panic: a
//! failure is returned as a [`tera::Error`] and aborts the render at the call
//! site, with any [`GiterminismError`] kept as the error source.
//!
//! ```text
//! configVersion: 1
//! project: {{ env(name="CI_PROJECT_NAME", default="demo") }}
//! ---
//! image: app
//! from: alpine
//! {%- for path, content in files_glob(pattern="conf/*.ini") %}
//! # {{ path }}
//! {%- endfor %}
//! {{ include(name="docker.tmpl") }}
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tera::{Context, Value};

use super::renderer::EngineState;
use crate::giterminism::{FileReader, GiterminismError};

/// Converts a resolver error into a Tera error, keeping a policy violation as
/// the source so it can be recovered after rendering.
pub(crate) fn into_tera_error(err: anyhow::Error) -> tera::Error {
    let message = format!("{err:#}");
    match err.chain().find_map(|cause| cause.downcast_ref::<GiterminismError>()) {
        Some(giterminism) => tera::Error::chain(message, giterminism.clone()),
        None => tera::Error::msg(message),
    }
}

fn required_string_arg(function: &str, args: &HashMap<String, Value>, name: &str) -> tera::Result<String> {
    match args.get(name) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(tera::Error::msg(format!(
            "{function}: argument '{name}' must be a string, got {other}"
        ))),
        None => Err(tera::Error::msg(format!("{function}: missing required argument '{name}'"))),
    }
}

/// Context for `include`/`tpl`: the root data when `data` is absent, the object
/// itself when it is one, otherwise the value under the key `value`.
fn data_context(data: Option<&Value>, root: &Value) -> tera::Result<Context> {
    let value = match data {
        None | Some(Value::Null) => root.clone(),
        Some(object @ Value::Object(_)) => object.clone(),
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other.clone());
            Value::Object(map)
        }
    };
    Context::from_value(value)
}

fn upgrade(state: &Weak<EngineState>) -> tera::Result<Arc<EngineState>> {
    state.upgrade().ok_or_else(|| tera::Error::msg("the template engine is no longer available"))
}

/// `env(name=...)`, also registered as `get_env` to replace Tera's ungated builtin.
pub fn create_env_function(reader: FileReader) -> impl tera::Function + 'static {
    move |args: &HashMap<String, Value>| -> tera::Result<Value> {
        let name = required_string_arg("env", args, "name")?;
        reader
            .report_config_go_template_rendering_env(&name)
            .map_err(|e| into_tera_error(e.context(format!("env('{name}')"))))?;

        match std::env::var(&name) {
            Ok(value) => Ok(Value::String(value)),
            Err(_) => Ok(args.get("default").cloned().unwrap_or_else(|| Value::String(String::new()))),
        }
    }
}

/// `files_get(path=...)`
pub fn create_files_get_function(reader: FileReader) -> impl tera::Function + 'static {
    move |args: &HashMap<String, Value>| -> tera::Result<Value> {
        let path = required_string_arg("files_get", args, "path")?;
        reader.files_get(&path).map(Value::String).map_err(into_tera_error)
    }
}

/// `files_glob(pattern=...)`
pub fn create_files_glob_function(reader: FileReader) -> impl tera::Function + 'static {
    move |args: &HashMap<String, Value>| -> tera::Result<Value> {
        let pattern = required_string_arg("files_glob", args, "pattern")?;
        let files = reader.files_glob(&pattern).map_err(into_tera_error)?;
        Ok(Value::Object(files.into_iter().map(|(path, content)| (path, Value::String(content))).collect()))
    }
}

/// `include(name=..., data=...)` renders a registered fragment.
pub fn create_include_function(state: Weak<EngineState>, root: Value) -> impl tera::Function + 'static {
    move |args: &HashMap<String, Value>| -> tera::Result<Value> {
        let name = required_string_arg("include", args, "name")?;
        let state = upgrade(&state)?;
        let _depth = state.enter()?;
        let context = data_context(args.get("data"), &root)?;

        state
            .tera()?
            .render(&name, &context)
            .map(Value::String)
            .map_err(|e| tera::Error::chain(format!("include('{name}')"), e))
    }
}

/// `tpl(template=..., data=...)` parses the string under a fresh name and renders it.
pub fn create_tpl_function(state: Weak<EngineState>, root: Value) -> impl tera::Function + 'static {
    move |args: &HashMap<String, Value>| -> tera::Result<Value> {
        let template = required_string_arg("tpl", args, "template")?;
        let state = upgrade(&state)?;
        let _depth = state.enter()?;
        let context = data_context(args.get("data"), &root)?;

        let name = state.next_tpl_name();
        let mut tera = state.tera()?.clone();
        tera.add_raw_template(&name, &template)
            .map_err(|e| tera::Error::chain("tpl: unable to parse the template string", e))?;
        tera.render(&name, &context).map(Value::String).map_err(|e| tera::Error::chain("tpl", e))
    }
}
