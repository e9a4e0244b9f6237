//! Corpus Ingest - Normalization pipeline for the document corpus.
//!
//! This crate provides:
//! - PDF text extraction and metadata heuristics
//! - Per-source normalization into canonical documents
//! - Syllabus extraction and chunking
//! - Model-backed type classification and field filling
//! - Schema validation
//! - The per-file processing state machine and its concurrent driver

mod classifier;
mod driver;
mod error;
mod extract;
mod filler;
mod ingestor;
mod normalizer;
mod pipeline;
mod prompts;
mod syllabus;
mod validator;

pub use classifier::TypeClassifier;
pub use driver::{
    default_workers, flush_pending_map_updates, read_progress, BatchReport, ConcurrentDriver,
    PendingUpdates, ProgressCallback,
};
pub use error::{IngestError, IngestResult};
pub use extract::{
    clean_text, guess_authors, guess_date, guess_title, load_manual_pdf, load_scraped_pdf,
    text_lines, ExtractedPdf, PdfTextExtractor, TextExtractor, UNKNOWN_TITLE,
};
pub use filler::{extract_json, truncate_chars, FieldFiller};
pub use ingestor::Ingestor;
pub use normalizer::{
    load_web_page, normalize_manual_pdf, normalize_scraped_pdf, normalize_web_entry,
    read_web_record, site_name_for, METADATA_FIELDS, UNKNOWN_PATH,
};
pub use pipeline::{
    output_name, Pipeline, PipelineOptions, PipelineOutcome, PipelineOutput, PipelineState, Stage,
};
pub use prompts::{
    PromptLibrary, BUILTIN_PROMPTS, DETECT_TYPE_PROMPT, METADATA_PROMPT, TAGS_PROMPT,
};
pub use syllabus::{chunk_syllabus, extract_syllabus_structure, extract_toc_and_courses};
pub use validator::{validate_syllabus, SchemaValidator, BUILTIN_SCHEMA};
