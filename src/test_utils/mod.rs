//! Test utilities for werf-config
//!
//! Shared by unit tests and, through the `test-utils` feature, by the
//! integration tests:
//!
//! - [`MemoryGitRepo`] - an in-memory commit for resolver tests
//! - [`TestGit`] - a wrapper around the `git` binary for real repositories
//! - [`TestProject`] - a temporary project directory, optionally under git
//!
//! # Example
//!
//! ```rust,no_run
//! use werf_config::test_utils::TestProject;
//!
//! # fn example() -> anyhow::Result<()> {
//! let project = TestProject::with_git()?;
//! project.write("werf.yaml", "configVersion: 1\nproject: demo\n")?;
//! project.commit_all("Initial commit")?;
//! let reader = project.reader(false)?;
//! # Ok(())
//! # }
//! ```

pub mod git_helper;
pub mod memory_repo;
pub mod project;

pub use git_helper::TestGit;
pub use memory_repo::MemoryGitRepo;
pub use project::TestProject;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Logging stays off unless a level is passed or `RUST_LOG` is set. Only the
/// first call has an effect.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
