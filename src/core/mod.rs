//! Core types shared by every module.
//!
//! Currently this is the error layer: [`WerfError`], the user-facing
//! [`ErrorContext`] and [`user_friendly_error`], which the CLI uses to turn any
//! `anyhow::Error` into a message with a suggestion.

pub mod error;

pub use error::{ErrorContext, WerfError, user_friendly_error};
