//! werf-config CLI entry point
//!
//! Parses the command line, runs the command and turns any error into a
//! message with a suggestion before exiting with status 1.

use clap::Parser;
use werf_config::cli;
use werf_config::core::user_friendly_error;

fn main() {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute() {
        user_friendly_error(e).display();
        std::process::exit(1);
    }
}
