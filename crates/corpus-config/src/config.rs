//! Configuration structures and loading.

use crate::error::{ConfigError, ConfigResult};
use crate::paths::{AppPaths, CorpusPaths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> ConfigResult<Self> {
        let paths = AppPaths::new().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&paths.config_file)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> ConfigResult<()> {
        let paths = AppPaths::new().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&paths.config_file)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Create a default config file with comments.
    pub fn create_default_file(path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::default_config_string())?;
        Ok(())
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.llm.host.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.host must not be empty".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model must not be empty".into()));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "llm.timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.pipeline.max_workers == Some(0) {
            return Err(ConfigError::Invalid(
                "pipeline.max_workers must be at least 1".into(),
            ));
        }
        if self.pipeline.max_prompt_chars == 0 || self.pipeline.classify_prefix_chars == 0 {
            return Err(ConfigError::Invalid(
                "pipeline prompt limits must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve every corpus location against the corpus root.
    pub fn corpus_paths(&self) -> ConfigResult<CorpusPaths> {
        CorpusPaths::resolve(&self.corpus)
    }

    /// Generate a default config file with helpful comments.
    pub fn default_config_string() -> String {
        r#"# Corpus Normalizer Configuration

[general]
# Data directory for logs and caches
# data_dir = "~/.local/share/corpus"

[corpus]
# Root of the corpus; relative paths below resolve against it
root = "."

# One sub-directory per scraped site, each holding pdf_scrapes/ and json_scrapes/
data_sites_dir = "data_sites"

# Manually uploaded PDFs (syllabi live in a syllabus/ sub-directory)
manual_pdf_dir = "pdf_man"

# Where normalized documents land
valid_dir = "json_normalized/validated"
rejected_dir = "json_normalized/rejected"
syllabus_dir = "json_normalized/syllabus"

# Holds input_maps/, output_maps/ and vect_maps/
maps_dir = "maps"

# Prompt templates overriding the built-in ones
prompts_dir = "prompts"

# JSON Schema every canonical document is validated against
schema_path = "schema/canonical_document.json"

# Polled by progress UIs
progress_file = "progress.json"

# Site directories never scanned
excluded_sites = ["archives"]

# File patterns to ignore
ignore_patterns = [
    "*.tmp",
    "*.temp",
    ".DS_Store",
    "._*",
    "*.part",
]

[llm]
# Ollama server address
host = "http://localhost:11434"

# Model used for classification and field filling
model = "llama3.1:8b"

# Hard timeout for a single call, in seconds. Calls are not retried.
timeout_seconds = 60

temperature = 0.3

[pipeline]
# Worker count; defaults to available cpus minus one
# max_workers = 4

# Bounded wait on map lock files, and age after which a lock is broken
lock_timeout_seconds = 30
stale_lock_seconds = 600

# Size cap of the document rendering sent to the field filler
max_prompt_chars = 20000

# Content prefix sent to the type classifier
classify_prefix_chars = 2000

# "graph" runs the per-source branches only.
# "classified" also detects document_type and fills type-specific fields.
routing = "graph"

# Write syllabus chunks next to the validated documents
emit_syllabus_chunks = true

# Promote rejected files into the output maps so they are not retried
credit_rejected = false
"#
        .to_string()
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub data_dir: Option<String>,
}

/// Locations of the corpus sources and outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub root: String,
    pub data_sites_dir: String,
    pub manual_pdf_dir: String,
    pub valid_dir: String,
    pub rejected_dir: String,
    pub syllabus_dir: String,
    pub maps_dir: String,
    pub prompts_dir: String,
    pub schema_path: String,
    pub progress_file: String,
    pub excluded_sites: Vec<String>,
    pub ignore_patterns: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            data_sites_dir: "data_sites".to_string(),
            manual_pdf_dir: "pdf_man".to_string(),
            valid_dir: "json_normalized/validated".to_string(),
            rejected_dir: "json_normalized/rejected".to_string(),
            syllabus_dir: "json_normalized/syllabus".to_string(),
            maps_dir: "maps".to_string(),
            prompts_dir: "prompts".to_string(),
            schema_path: "schema/canonical_document.json".to_string(),
            progress_file: "progress.json".to_string(),
            excluded_sites: vec!["archives".to_string()],
            ignore_patterns: vec![
                "*.tmp".to_string(),
                "*.temp".to_string(),
                ".DS_Store".to_string(),
                "._*".to_string(),
                "*.part".to_string(),
            ],
        }
    }
}

/// Ollama LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_seconds: 60,
            temperature: 0.3,
        }
    }
}

/// Which stages a document goes through between loading and validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Per-source branches only; document type comes from the branch.
    #[default]
    Graph,
    /// Adds type detection and type-specific field filling.
    Classified,
}

/// Pipeline and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_workers: Option<usize>,
    pub lock_timeout_seconds: u64,
    pub stale_lock_seconds: u64,
    pub max_prompt_chars: usize,
    pub classify_prefix_chars: usize,
    pub routing: RoutingMode,
    pub emit_syllabus_chunks: bool,
    pub credit_rejected: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            lock_timeout_seconds: 30,
            stale_lock_seconds: 600,
            max_prompt_chars: 20_000,
            classify_prefix_chars: 2_000,
            routing: RoutingMode::Graph,
            emit_syllabus_chunks: true,
            credit_rejected: false,
        }
    }
}
