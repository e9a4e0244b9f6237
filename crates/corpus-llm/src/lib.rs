//! Corpus LLM - Ollama integration for the corpus normalizer.
//!
//! This crate provides the async Ollama client, the [`LanguageModel`] seam the
//! pipeline calls through, and a scripted model for tests.

mod client;
mod error;
mod mock;
mod model;
mod types;

pub use client::OllamaClient;
pub use error::{LlmError, LlmResult};
pub use mock::ScriptedModel;
pub use model::{LanguageModel, OllamaModel};
pub use types::*;
