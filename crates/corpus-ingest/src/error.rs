//! Error types for the normalization pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can occur while normalizing a document.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Map error: {0}")]
    Map(#[from] corpus_maps::MapError),

    #[error("Config error: {0}")]
    Config(#[from] corpus_config::ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] corpus_llm::LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Parse error for {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("No content could be read from {0}")]
    EmptyContent(PathBuf),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Field filling with {template} failed: {message}")]
    FieldFill { template: String, message: String },

    #[error("Unrecognized syllabus layout: {0}")]
    SyllabusFormat(String),

    #[error("Prompt template not found: {0}")]
    PromptNotFound(String),

    #[error("Fatal configuration error: {0}")]
    FatalConfig(String),

    #[error("Worker task failed: {0}")]
    Task(String),
}
