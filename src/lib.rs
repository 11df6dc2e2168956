//! werf-config - giterminism-aware werf.yaml processing
//!
//! Turns a project's `werf.yaml` (plus the `*.tmpl` fragments beside it) into
//! a validated description of the images and artifacts to build. Every file
//! the pipeline reads goes through one policy: in strict mode it must come
//! from the head commit of the project repository and match the working tree,
//! so a config renders the same on every machine that has the same commit.
//!
//! # Pipeline
//!
//! 1. [`giterminism`] decides where each file is read from and reports
//!    uncommitted or modified files.
//! 2. [`templating`] renders the config with Tera, exposing `env`, `files_get`,
//!    `files_glob`, `include` and `tpl` to templates.
//! 3. [`config`] splits the rendered stream into sections, classifies and
//!    strictly unmarshals them, then validates names, references, imports and
//!    the dependency graph.
//!
//! # Modules
//!
//! - [`cli`] - `render` and `validate` commands
//! - [`config`] - document splitter, directives, validation, [`config::WerfConfig`]
//! - [`core`] - user-facing errors
//! - [`git`] - read-only access to the local repository through the `git` binary
//! - [`giterminism`] - allow-list, [`giterminism::GiterminismManager`], [`giterminism::FileReader`]
//! - [`secret`] - secret values of the helm chart
//! - [`templating`] - the template renderer and its functions
//! - [`utils`] - path, glob and slug helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use werf_config::config::{WerfConfigOptions, get_werf_config};
//! use werf_config::git::{GitRepo, LocalGitRepo};
//! use werf_config::giterminism::{FileReader, GiterminismManager, GiterminismOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let repo = GitRepo::open(".")?.map(|repo| Arc::new(repo) as Arc<dyn LocalGitRepo>);
//! let manager = GiterminismManager::new(".", repo, &GiterminismOptions::default())?;
//! let reader = FileReader::new(Arc::new(manager));
//!
//! let config = get_werf_config(&reader, None, ".werf", &WerfConfigOptions::default())?;
//! println!("project {}", config.meta.project);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod git;
pub mod giterminism;
pub mod secret;
pub mod templating;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
