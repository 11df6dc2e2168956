//! Command-line interface for werf-config.
//!
//! Two commands sit on top of the config pipeline:
//!
//! - `render` - print the rendered config, or the sections of selected images
//! - `validate` - render, parse and validate the config and summarise it
//!
//! Both share the global options that locate the project and set the
//! giterminism mode:
//!
//! ```bash
//! # Strict mode: every file comes from the head commit
//! werf-config validate --dir ./project
//!
//! # Loose mode: read the working tree as is
//! WERF_LOOSE_GITERMINISM=1 werf-config render backend frontend
//!
//! # Custom config and templates directory
//! werf-config render --config werf-ci.yaml --config-templates-dir ci/templates
//! ```

mod render;
mod validate;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_CONFIG_TEMPLATES_DIR, WerfConfigOptions};
use crate::git::{GitRepo, LocalGitRepo};
use crate::giterminism::{
    FileReader, GITERMINISM_CONFIG_NAME, GiterminismManager, GiterminismOptions,
};

/// Runtime configuration derived from the global flags.
///
/// Kept apart from [`Cli`] so tests can drive commands without parsing
/// arguments.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Filter used when `RUST_LOG` is unset. `None` keeps logging off.
    pub log_level: Option<String>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Installs the global subscriber. `RUST_LOG` wins over the flags.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if let Some(level) = &self.log_level {
            EnvFilter::new(level)
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

#[derive(Parser)]
#[command(
    name = "werf-config",
    about = "Render and validate werf configuration",
    version,
    long_about = "Renders werf.yaml with its templates, reading every file according to the giterminism policy, and validates the resulting images and artifacts."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

/// Options shared by every command.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Project directory
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Config path relative to the project directory (default werf.yaml, then werf.yml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Directory with *.tmpl fragments, relative to the project directory
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_TEMPLATES_DIR)]
    pub config_templates_dir: String,

    /// Value of `Env` in templates
    #[arg(long, global = true, default_value = "")]
    pub env: String,

    /// Read every file from the working tree instead of the head commit
    #[arg(
        long,
        global = true,
        env = "WERF_LOOSE_GITERMINISM",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub loose_giterminism: bool,

    /// Giterminism allow-list path relative to the project directory
    #[arg(long, global = true, default_value = GITERMINISM_CONFIG_NAME)]
    pub giterminism_config: String,

    /// Keep the rendered config file and log its path
    #[arg(long, global = true)]
    pub log_rendered_file_path: bool,
}

impl GlobalArgs {
    /// Builds the file reader for the project.
    pub fn file_reader(&self) -> Result<FileReader> {
        let repo = GitRepo::open(&self.dir)
            .with_context(|| format!("unable to open the git repository of {}", self.dir.display()))?
            .map(|repo| Arc::new(repo) as Arc<dyn LocalGitRepo>);

        let options = GiterminismOptions {
            loose: self.loose_giterminism,
            config_path: self.giterminism_config.clone(),
        };
        let manager = GiterminismManager::new(&self.dir, repo, &options)?;
        Ok(FileReader::new(Arc::new(manager)))
    }

    #[must_use]
    pub fn config_options(&self) -> WerfConfigOptions {
        WerfConfigOptions {
            log_rendered_file_path: self.log_rendered_file_path,
            env: self.env.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered config
    Render(render::RenderCommand),

    /// Validate the config and print a summary
    Validate(validate::ValidateCommand),
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(&config)
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
        }
    }

    pub fn execute_with_config(self, config: &CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Render(cmd) => cmd.execute(&self.global),
            Commands::Validate(cmd) => cmd.execute(&self.global, self.quiet),
        }
    }
}
