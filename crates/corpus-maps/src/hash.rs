//! Streaming SHA-256 of source files.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::warn;

const CHUNK_SIZE: usize = 8192;

/// Hex SHA-256 of a file's content, read in fixed-size chunks.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Like [`hash_file`], but an unreadable file yields `None` so a scan can
/// skip it and keep going.
pub fn compute_hash(path: &Path) -> Option<String> {
    match hash_file(path) {
        Ok(hash) => Some(hash),
        Err(e) => {
            warn!("Failed to hash {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            compute_hash(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_large_file_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut content = vec![7u8; CHUNK_SIZE * 3 + 11];
        std::fs::write(&path, &content).unwrap();
        let first = compute_hash(&path).unwrap();

        content[CHUNK_SIZE * 2] = 8;
        std::fs::write(&path, &content).unwrap();
        assert_ne!(compute_hash(&path).unwrap(), first);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(compute_hash(&dir.path().join("gone.pdf")).is_none());
    }
}
