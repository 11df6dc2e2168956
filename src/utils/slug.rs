//! Project-name slugs.

use regex::Regex;
use std::sync::LazyLock;

/// Longest project name accepted in the meta section.
pub const MAX_PROJECT_NAME_LENGTH: usize = 50;

static PROJECT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("project name regex is valid"));

/// Returns `true` if `name` can be used verbatim as a project name.
#[must_use]
pub fn is_valid_project_name(name: &str) -> bool {
    name.len() <= MAX_PROJECT_NAME_LENGTH && PROJECT_NAME_RE.is_match(name)
}

/// Converts an arbitrary name (directory basename, git remote path) into a
/// valid project name.
///
/// Runs of characters outside `[a-z0-9]` collapse into a single dash and the
/// result is cut to [`MAX_PROJECT_NAME_LENGTH`].
#[must_use]
pub fn project_slug(name: &str) -> String {
    if is_valid_project_name(name) {
        return name.to_string();
    }

    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_PROJECT_NAME_LENGTH);
    slug.trim_end_matches('-').to_string()
}
