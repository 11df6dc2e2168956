//! The `render` command.

use anyhow::Result;
use clap::Args;

use super::GlobalArgs;
use crate::config::render_werf_config;

/// Print the rendered werf config.
///
/// Without image names the whole rendered stream is printed. With names, only
/// the sections declaring those images or artifacts, in the given order.
#[derive(Debug, Args)]
pub struct RenderCommand {
    /// Images or artifacts to print
    #[arg(value_name = "IMAGE")]
    pub images: Vec<String>,
}

impl RenderCommand {
    pub fn execute(self, global: &GlobalArgs) -> Result<()> {
        let reader = global.file_reader()?;
        let output = render_werf_config(
            &reader,
            global.config.as_deref(),
            &global.config_templates_dir,
            &self.images,
            &global.config_options(),
        )?;

        print!("{output}");
        if !output.is_empty() && !output.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
