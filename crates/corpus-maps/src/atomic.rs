//! Crash-safe file replacement.

use crate::error::{MapError, MapResult};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Replace `path` with `bytes` so readers see either the old or the new
/// content, never a partial write.
///
/// The bytes go to a temporary file in the destination directory, are
/// flushed and synced, then renamed over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> MapResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    match tmp.persist(path) {
        Ok(_) => Ok(()),
        Err(err) => {
            // Rename over an existing file is not supported everywhere.
            warn!(
                "Rename over {:?} failed ({}), replacing non-atomically",
                path, err.error
            );
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            err.file.persist(path).map_err(|e| MapError::Persist {
                path: path.to_path_buf(),
                message: e.error.to_string(),
            })?;
            Ok(())
        }
    }
}

/// Pretty-print `value` as JSON and write it with [`write_atomic`].
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> MapResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}
