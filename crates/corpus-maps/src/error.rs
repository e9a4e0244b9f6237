//! Map store error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timed out after {seconds}s waiting for lock on {path:?}")]
    LockTimeout { path: PathBuf, seconds: u64 },

    #[error("Failed to move temporary file into {path:?}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error("Invalid map name: {0}")]
    InvalidMapName(String),
}

pub type MapResult<T> = Result<T, MapError>;
