//! Language model errors.

use thiserror::Error;

/// Why a model call produced no usable answer. Every variant is a per-file
/// failure for the pipeline, never a reason to stop a batch.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Cannot reach the model: {0}")]
    Connection(String),

    /// The hard per-call timeout expired. Calls are not retried.
    #[error("Model call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Model {model} is not installed. Run 'ollama pull {model}'.")]
    ModelNotFound { model: String },

    #[error("No Ollama server at {host}. Start it with 'ollama serve'.")]
    ServerNotRunning { host: String },

    #[error("Ollama answered {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Unreadable model response: {0}")]
    ParseError(String),

    #[error("Model {model} returned an empty response")]
    EmptyResponse { model: String },

    #[error("Invalid model settings: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type LlmResult<T> = Result<T, LlmError>;
