//! Corpus Maps - Content-hash maps and change detection.
//!
//! Every source collection has one map per generation (input, output,
//! to-process) persisted as JSON. Maps are written atomically and their
//! read-modify-write cycles are guarded by lock files.

mod atomic;
mod detector;
mod error;
mod hash;
mod lock;
mod store;

pub use atomic::{write_atomic, write_json_atomic};
pub use detector::{ChangeDetector, PruneReport, SourceLayout};
pub use error::{MapError, MapResult};
pub use hash::{compute_hash, hash_file};
pub use lock::FileLock;
pub use store::{load_map, save_map, MapStore};
