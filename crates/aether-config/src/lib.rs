//! Persistent settings for the atmosphere tools.
//!
//! Settings live in `config.ron` and can be overridden from the command line.
//! Unknown fields are ignored and missing ones fall back to defaults, so old
//! files keep loading as the structs grow.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{BakeConfig, Config, DebugConfig, PrecomputeConfig, SkyConfig, default_config_dir};
pub use error::ConfigError;
