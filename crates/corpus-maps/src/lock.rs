//! Advisory lock files guarding map read-modify-write cycles.

use crate::error::{MapError, MapResult};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive lock on a file, held through a sibling `<file>.lock` that is
/// created with `create_new` and holds the owner's token.
///
/// Dropping the lock removes the lock file if it still carries our token.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
    token: String,
    held: bool,
}

impl FileLock {
    /// Lock file used for `target`.
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Wait up to `timeout` for the lock on `target`.
    ///
    /// Lock files older than `stale_after` are treated as left over by a
    /// dead process and broken. When the lock file cannot be created for a
    /// reason other than contention, the returned guard is not held and the
    /// caller proceeds unlocked.
    pub fn acquire(target: &Path, timeout: Duration, stale_after: Duration) -> MapResult<Self> {
        let lock_path = Self::lock_path_for(target);
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        if let Some(parent) = lock_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(token.as_bytes()) {
                        warn!("Could not write lock token to {:?}: {}", lock_path, e);
                    }
                    debug!("Acquired {:?}", lock_path);
                    return Ok(Self {
                        lock_path,
                        token,
                        held: true,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&lock_path, stale_after) {
                        warn!("Breaking stale lock {:?}", lock_path);
                        let _ = std::fs::remove_file(&lock_path);
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(MapError::LockTimeout {
                            path: target.to_path_buf(),
                            seconds: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    warn!(
                        "Cannot create lock file {:?} ({}), continuing without lock",
                        lock_path, e
                    );
                    return Ok(Self {
                        lock_path,
                        token,
                        held: false,
                    });
                }
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        // Someone may have broken our lock as stale and taken it over.
        match std::fs::read_to_string(&self.lock_path) {
            Ok(owner) if owner == self.token => {
                if let Err(e) = std::fs::remove_file(&self.lock_path) {
                    warn!("Failed to release {:?}: {}", self.lock_path, e);
                }
            }
            Ok(_) => warn!("Lock {:?} was taken over, leaving it", self.lock_path),
            Err(_) => {}
        }
    }
}

fn is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    std::fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > stale_after)
        .unwrap_or(false)
}
