//! Integration test suite for werf-config
//!
//! End-to-end tests that drive real git repositories in temporary directories
//! and the `werf-config` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **giterminism**: strict and loose reads, allow-list, env gating
//! - **render**: the `render` command, templates, image selection
//! - **validate**: the `validate` command and config errors

#[path = "../common/mod.rs"]
mod common;

mod giterminism;
mod render;
mod validate;
