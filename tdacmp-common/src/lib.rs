//! # tdacmp Common Library
//!
//! Shared code for the tdacmp crates:
//! - Error type for configuration and file handling
//! - TOML configuration loading with CLI/env/file/default priority
//! - Atomic report writes
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;

pub use config::{ConfigResolver, SolverMethod, TomlConfig};
pub use error::{Error, Result};
