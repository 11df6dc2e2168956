//! Filesystem, path and naming utilities shared by the readers and the parser.
//!
//! # Modules
//!
//! - [`fs`] - Working-tree existence checks and glob walks with the symlink policy
//! - [`platform`] - Git executable name, path normalisation, project-relative joins
//! - [`slug`] - Project-name validation and slugification

pub mod fs;
pub mod platform;
pub mod slug;

pub use fs::{MatchedFile, compile_glob, glob_matches, walk_by_pattern};
pub use platform::{normalize_path_for_storage, safe_join};
pub use slug::{is_valid_project_name, project_slug};
