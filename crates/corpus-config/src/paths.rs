//! Application and corpus paths management.

use crate::config::CorpusConfig;
use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Manages all application paths following platform conventions.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Create paths using platform-specific directories.
    pub fn new() -> Option<Self> {
        let proj_dirs = ProjectDirs::from("org", "corpus", "corpus")?;

        let config_dir = proj_dirs.config_dir().to_path_buf();
        let data_dir = proj_dirs.data_dir().to_path_buf();

        Some(Self {
            config_file: config_dir.join("config.toml"),
            log_dir: data_dir.join("logs"),
            config_dir,
            data_dir,
        })
    }

    /// Create all necessary directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file.exists()
    }
}

/// Corpus locations with `~` expanded and relative entries joined onto the
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusPaths {
    pub root: PathBuf,
    pub data_sites_dir: PathBuf,
    pub manual_pdf_dir: PathBuf,
    pub valid_dir: PathBuf,
    pub rejected_dir: PathBuf,
    pub syllabus_dir: PathBuf,
    pub maps_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub schema_path: PathBuf,
    pub progress_file: PathBuf,
}

impl CorpusPaths {
    pub fn resolve(config: &CorpusConfig) -> ConfigResult<Self> {
        let root = expand(&config.root)?;
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };

        let under_root = |value: &str| -> ConfigResult<PathBuf> {
            let path = expand(value)?;
            Ok(if path.is_absolute() {
                path
            } else {
                root.join(path)
            })
        };

        Ok(Self {
            data_sites_dir: under_root(&config.data_sites_dir)?,
            manual_pdf_dir: under_root(&config.manual_pdf_dir)?,
            valid_dir: under_root(&config.valid_dir)?,
            rejected_dir: under_root(&config.rejected_dir)?,
            syllabus_dir: under_root(&config.syllabus_dir)?,
            maps_dir: under_root(&config.maps_dir)?,
            prompts_dir: under_root(&config.prompts_dir)?,
            schema_path: under_root(&config.schema_path)?,
            progress_file: under_root(&config.progress_file)?,
            root,
        })
    }

    /// Create the directories the pipeline writes into.
    pub fn ensure_output_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.valid_dir,
            &self.rejected_dir,
            &self.syllabus_dir,
            &self.maps_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(parent) = self.progress_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Path of `path` relative to the corpus root, for display.
    pub fn display_relative<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
    }
}

fn expand(value: &str) -> ConfigResult<PathBuf> {
    let expanded = shellexpand::full(value)
        .map_err(|e| ConfigError::PathExpansion {
            path: PathBuf::from(value),
            message: e.to_string(),
        })?;
    Ok(PathBuf::from(expanded.as_ref()))
}
