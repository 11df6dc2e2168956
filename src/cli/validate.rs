//! The `validate` command.
//!
//! Runs the whole pipeline (render, split, classify, assemble), reads the
//! Dockerfiles of Dockerfile images and prints a summary of the result. Any
//! failure is reported as a single error; in JSON mode the result object is
//! printed first so scripts can inspect it.

use anyhow::{Context, Result, anyhow};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::GlobalArgs;
use crate::config::error::display_name;
use crate::config::{WerfConfig, get_werf_config};
use crate::giterminism::FileReader;

/// Validate the werf config of the project.
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Output format: text or json
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// What `validate --format json` prints.
#[derive(Debug, Default, Serialize)]
pub struct ValidationResults {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub images: Vec<String>,
    pub artifacts: Vec<String>,
    /// Every image and artifact, dependencies first.
    pub build_order: Vec<String>,
    pub imports: Vec<ImportSummary>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub consumer: String,
    pub source: String,
    pub add: String,
    pub to: String,
}

impl ValidationResults {
    fn from_config(config: &WerfConfig) -> Result<Self> {
        let imports = config
            .imports_by_source
            .iter()
            .flat_map(|(source, refs)| {
                refs.iter().map(move |import_ref| ImportSummary {
                    consumer: display_name(&import_ref.consumer).to_string(),
                    source: format!("{} {}", import_ref.import.source.directive(), source),
                    add: import_ref.import.add.clone(),
                    to: import_ref.import.to.clone(),
                })
            })
            .collect();

        Ok(Self {
            valid: true,
            project: Some(config.meta.project.clone()),
            images: config.image_names().into_iter().map(|name| display_name(name).to_string()).collect(),
            artifacts: config.artifacts.iter().map(|artifact| artifact.base.name.clone()).collect(),
            build_order: config
                .dependency_order()?
                .iter()
                .map(|name| display_name(name).to_string())
                .collect(),
            imports,
            errors: Vec::new(),
        })
    }

    fn print_text(&self) {
        if let Some(project) = &self.project {
            println!("{} werf config of project {} is valid", "✓".green(), project.bold());
        }
        println!("  images:    {}", list_or_none(&self.images));
        println!("  artifacts: {}", list_or_none(&self.artifacts));
        println!("  build order: {}", self.build_order.join(" → "));
        for import in &self.imports {
            println!("  {} imports {} from {} to {}", import.consumer, import.add, import.source, import.to);
        }
    }
}

/// Dockerfiles and `.dockerignore` files must be readable under the
/// giterminism policy, the same way a build would read them.
fn check_dockerfiles(config: &WerfConfig, reader: &FileReader) -> Result<()> {
    for image in &config.images_from_dockerfile {
        image
            .read_dockerfile(reader)
            .and_then(|_| image.read_dockerignore(reader))
            .with_context(|| format!("image {}", display_name(&image.name)))?;
    }
    Ok(())
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".dimmed().to_string()
    } else {
        names.join(", ")
    }
}

impl ValidateCommand {
    pub fn execute(self, global: &GlobalArgs, quiet: bool) -> Result<()> {
        let outcome = global.file_reader().and_then(|reader| {
            let config = get_werf_config(
                &reader,
                global.config.as_deref(),
                &global.config_templates_dir,
                &global.config_options(),
            )?;
            check_dockerfiles(&config, &reader)?;
            ValidationResults::from_config(&config)
        });

        match (outcome, &self.format) {
            (Ok(results), OutputFormat::Json) => {
                println!("{}", serde_json::to_string_pretty(&results)?);
                Ok(())
            }
            (Ok(results), OutputFormat::Text) => {
                if !quiet {
                    results.print_text();
                }
                Ok(())
            }
            (Err(error), OutputFormat::Json) => {
                let results = ValidationResults {
                    errors: vec![format!("{error:#}")],
                    ..Default::default()
                };
                println!("{}", serde_json::to_string_pretty(&results)?);
                Err(anyhow!("werf config validation failed"))
            }
            (Err(error), OutputFormat::Text) => Err(error),
        }
    }
}
