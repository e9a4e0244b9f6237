//! Corpus Config - Configuration management for the corpus normalizer.

mod config;
mod error;
mod paths;

pub use config::*;
pub use error::{ConfigError, ConfigResult};
pub use paths::{AppPaths, CorpusPaths};
