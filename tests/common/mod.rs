//! Common helpers for werf-config integration tests
//!
//! Projects come from [`werf_config::test_utils::TestProject`]; this module
//! adds running the binary against them and a few canned configs.

// Not every test module uses every helper
#![allow(dead_code)]

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// A meta section followed by a stapel image, an artifact and a Dockerfile image.
pub const BASIC_CONFIG: &str = r#"configVersion: 1
project: demo
---
artifact: builder
from: golang:1.22
shell:
  install:
  - go build -o /out/app ./...
---
image: app
from: alpine:3.20
import:
- artifact: builder
  add: /out
  to: /usr/local/bin
  after: install
---
image: worker
dockerfile: Dockerfile.worker
"#;

/// Runs the binary inside `project_dir` with a clean giterminism environment.
pub fn run_werf_config(project_dir: &Path, args: &[&str]) -> Result<CommandOutput> {
    run_werf_config_with_env(project_dir, args, &[])
}

pub fn run_werf_config_with_env(
    project_dir: &Path,
    args: &[&str],
    envs: &[(&str, &str)],
) -> Result<CommandOutput> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_werf-config"));
    command
        .args(args)
        .current_dir(project_dir)
        .env_remove("WERF_LOOSE_GITERMINISM")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    for (key, value) in envs {
        command.env(key, value);
    }

    let output = command.output().context("Failed to run werf-config")?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Command output helper
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success,
            "Command failed with code {:?}\nStderr: {}",
            self.code, self.stderr
        );
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(!self.success, "Command unexpectedly succeeded\nStdout: {}", self.stdout);
        assert_eq!(self.code, Some(1));
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Expected stdout to contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Expected stderr to contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
