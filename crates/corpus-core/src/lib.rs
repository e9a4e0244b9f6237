//! Corpus Core - Domain types shared by the corpus normalization crates.

mod error;
mod files;
mod types;

pub use error::{Error, Result};
pub use files::*;
pub use types::*;
