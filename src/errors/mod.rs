//! # Error Handling
//!
//! Error types for the bootstrap pipelines, defined with `thiserror`.

pub mod types;

pub use types::{BootstrapError, ErrorCategory, Result};
