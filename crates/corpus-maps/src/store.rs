//! Persisted hash maps, one JSON file per map name and generation.

use crate::atomic::write_json_atomic;
use crate::error::MapResult;
use crate::lock::FileLock;
use corpus_core::{FileMap, Generation, MapName, SourceFileRecord};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Map entries as found on disk. Older maps stored the bare hash.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Record(SourceFileRecord),
    HashOnly(String),
}

/// Read a map file. A missing or unparseable file reads as an empty map.
pub fn load_map(path: &Path) -> FileMap {
    if !path.exists() {
        return FileMap::new();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot read map {:?}, treating as empty: {}", path, e);
            return FileMap::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, StoredEntry>>(&text) {
        Ok(entries) => entries
            .into_iter()
            .map(|(name, entry)| {
                let record = match entry {
                    StoredEntry::Record(record) => record,
                    StoredEntry::HashOnly(hash) => SourceFileRecord::new(hash, ""),
                };
                (name, record)
            })
            .collect(),
        Err(e) => {
            warn!("Malformed map {:?}, treating as empty: {}", path, e);
            FileMap::new()
        }
    }
}

/// Write a map file atomically.
pub fn save_map(path: &Path, map: &FileMap) -> MapResult<()> {
    write_json_atomic(path, map)
}

/// The three generations of maps under one root directory
/// (`input_maps/`, `output_maps/`, `vect_maps/`).
#[derive(Debug, Clone)]
pub struct MapStore {
    root: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
}

impl MapStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: Duration::from_secs(30),
            stale_after: Duration::from_secs(600),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, generation: Generation) -> PathBuf {
        self.root.join(generation.dir_name())
    }

    pub fn map_path(&self, generation: Generation, name: &MapName) -> PathBuf {
        self.dir(generation).join(name.file_name())
    }

    pub fn ensure_dirs(&self) -> MapResult<()> {
        for generation in Generation::ALL {
            std::fs::create_dir_all(self.dir(generation))?;
        }
        Ok(())
    }

    pub fn exists(&self, generation: Generation, name: &MapName) -> bool {
        self.map_path(generation, name).exists()
    }

    pub fn load(&self, generation: Generation, name: &MapName) -> FileMap {
        load_map(&self.map_path(generation, name))
    }

    pub fn save(&self, generation: Generation, name: &MapName, map: &FileMap) -> MapResult<()> {
        let path = self.map_path(generation, name);
        debug!("Saving {} entries to {:?}", map.len(), path);
        save_map(&path, map)
    }

    /// Take the lock of one map file.
    pub fn lock(&self, generation: Generation, name: &MapName) -> MapResult<FileLock> {
        FileLock::acquire(
            &self.map_path(generation, name),
            self.lock_timeout,
            self.stale_after,
        )
    }

    /// Load, modify and save one map while holding its lock.
    pub fn update<F>(&self, generation: Generation, name: &MapName, f: F) -> MapResult<FileMap>
    where
        F: FnOnce(&mut FileMap),
    {
        let _lock = self.lock(generation, name)?;
        let mut map = self.load(generation, name);
        f(&mut map);
        self.save(generation, name, &map)?;
        Ok(map)
    }

    /// Names of the maps present in one generation. Files that are not map
    /// files are ignored.
    pub fn list(&self, generation: Generation) -> MapResult<Vec<MapName>> {
        let dir = self.dir(generation);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(name) = MapName::from_file_name(&file_name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete one map file. Returns whether it existed.
    pub fn remove(&self, generation: Generation, name: &MapName) -> MapResult<bool> {
        let path = self.map_path(generation, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Total entries per map in one generation.
    pub fn counts(&self, generation: Generation) -> MapResult<BTreeMap<MapName, usize>> {
        Ok(self
            .list(generation)?
            .into_iter()
            .map(|name| {
                let len = self.load(generation, &name).len();
                (name, len)
            })
            .collect())
    }
}
