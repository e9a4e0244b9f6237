//! PDF text extraction and the heuristics that guess metadata from it.

use crate::error::{IngestError, IngestResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path};
use tracing::{debug, warn};

/// Title guessed when no line looks like one.
pub const UNKNOWN_TITLE: &str = "Titre inconnu";

const NO_SPECIALTY: &str = "NA";

/// Turns a document file into raw text.
pub trait TextExtractor: Send + Sync {
    /// Extract the text of the file at `path`, pages separated by newlines.
    fn extract_text(&self, path: &Path) -> IngestResult<String>;

    /// Extractor name for logs.
    fn name(&self) -> &'static str;
}

/// Extractor for PDF files backed by `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> IngestResult<String> {
        if !path.exists() {
            return Err(IngestError::FileNotFound(path.to_path_buf()));
        }

        debug!("Extracting text from PDF: {:?}", path);

        // pdf-extract panics on some malformed files.
        let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text(path));
        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return Err(IngestError::ParseError {
                    path: path.to_path_buf(),
                    message: format!("Failed to extract text from PDF: {}", e),
                })
            }
            Err(_) => {
                return Err(IngestError::ParseError {
                    path: path.to_path_buf(),
                    message: "PDF extractor panicked".to_string(),
                })
            }
        };

        debug!("Extracted {} characters from PDF", text.len());
        Ok(text.replace('\x0C', "\n"))
    }

    fn name(&self) -> &'static str {
        "pdf-extract"
    }
}

lazy_static! {
    static ref CONTROL_CHARS: Regex =
        Regex::new(r"[^\x09\x0A\x0D\x20-\x7E\u{00A0}-\u{FFFF}]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref AUTHOR_LINE: Regex =
        Regex::new(r"(?i)(auteur|author|réalisé par|nom|par)[^\n:]*[:\-]?\s*(.*)").unwrap();
    static ref AUTHOR_SEPARATOR: Regex = Regex::new(r"[;,/]| et ").unwrap();
    static ref DATE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"\b(\d{2}/\d{2}/\d{4})\b").unwrap(),
        Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap(),
        Regex::new(r"\b(\d{2}\.\d{2}\.\d{4})\b").unwrap(),
        Regex::new(r"\b(\d{4})\b").unwrap(),
    ];
}

/// Drop unprintable characters and collapse all whitespace to single spaces.
pub fn clean_text(text: &str) -> String {
    let printable = CONTROL_CHARS.replace_all(text, "");
    WHITESPACE.replace_all(&printable, " ").trim().to_string()
}

/// Trimmed, non-empty lines.
pub fn text_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// First of the first ten lines longer than ten characters.
pub fn guess_title(lines: &[String]) -> String {
    lines
        .iter()
        .take(10)
        .find(|l| l.chars().count() > 10)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}

/// Names following the first author marker (`Auteur :`, `réalisé par`...).
pub fn guess_authors(lines: &[String]) -> Vec<String> {
    for line in lines {
        if let Some(caps) = AUTHOR_LINE.captures(line) {
            let names = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            return AUTHOR_SEPARATOR
                .split(names)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    Vec::new()
}

/// First date-looking token within the first twenty lines.
pub fn guess_date(lines: &[String]) -> Option<String> {
    for line in lines.iter().take(20) {
        for pattern in DATE_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(line) {
                return caps.get(1).map(|m| m.as_str().to_string());
            }
        }
    }
    None
}

/// A PDF read from disk, with its heuristic metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPdf {
    /// Site the PDF was scraped from, or `pdf_manual`.
    pub source: String,
    pub file_name: String,
    pub pdf_path: String,
    pub specialty: String,
    pub content: String,
    pub metadata: Map<String, Value>,
}

fn extract_common(
    extractor: &dyn TextExtractor,
    path: &Path,
    source: String,
    specialty: String,
) -> IngestResult<Option<ExtractedPdf>> {
    let text = extractor.extract_text(path)?;
    let lines = text_lines(&text);
    if lines.is_empty() {
        warn!("No text found in {:?}", path);
        return Ok(None);
    }

    let mut metadata = Map::new();
    metadata.insert("title".into(), Value::String(guess_title(&lines)));
    metadata.insert(
        "auteurs".into(),
        Value::Array(guess_authors(&lines).into_iter().map(Value::String).collect()),
    );
    metadata.insert(
        "date".into(),
        guess_date(&lines).map(Value::String).unwrap_or(Value::Null),
    );

    Ok(Some(ExtractedPdf {
        source,
        file_name: file_name(path),
        pdf_path: path.to_string_lossy().into_owned(),
        specialty,
        content: clean_text(&lines.join("\n")),
        metadata,
    }))
}

/// Read a PDF downloaded by the scraper.
///
/// The site is the directory holding `pdf_scrapes/`, the specialty the
/// directory right below it. Entries of the site's `pdf_map.json` for this
/// file override the guessed metadata.
pub fn load_scraped_pdf(
    extractor: &dyn TextExtractor,
    path: &Path,
) -> IngestResult<Option<ExtractedPdf>> {
    let parts: Vec<String> = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let scrapes_idx = parts.iter().rposition(|p| p == "pdf_scrapes");

    let site = scrapes_idx
        .and_then(|i| i.checked_sub(1))
        .map(|i| parts[i].clone())
        .unwrap_or_else(|| "unknown_site".to_string());
    let specialty = scrapes_idx
        .filter(|i| i + 2 < parts.len())
        .map(|i| parts[i + 1].clone())
        .unwrap_or_else(|| NO_SPECIALTY.to_string());

    let Some(mut extracted) = extract_common(extractor, path, site, specialty)? else {
        return Ok(None);
    };

    let site_dir = path
        .ancestors()
        .find(|a| a.file_name().map(|n| n == "pdf_scrapes").unwrap_or(false))
        .and_then(Path::parent);
    if let Some(site_dir) = site_dir {
        if let Some(extra) = site_pdf_metadata(&site_dir.join("pdf_map.json"), &extracted.file_name)
        {
            extracted.metadata.extend(extra);
        }
    }
    Ok(Some(extracted))
}

/// Read a manually uploaded PDF. The specialty is the directory right
/// below `manual_root`.
pub fn load_manual_pdf(
    extractor: &dyn TextExtractor,
    path: &Path,
    manual_root: &Path,
) -> IngestResult<Option<ExtractedPdf>> {
    let specialty = path
        .strip_prefix(manual_root)
        .ok()
        .filter(|rel| rel.components().count() >= 2)
        .and_then(|rel| rel.components().next())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_else(|| NO_SPECIALTY.to_string());

    extract_common(extractor, path, "pdf_manual".to_string(), specialty)
}

fn site_pdf_metadata(map_path: &Path, file_name: &str) -> Option<Map<String, Value>> {
    if !map_path.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(map_path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(Value::Object(mut map)) => match map.remove(file_name) {
            Some(Value::Object(entry)) => Some(entry),
            _ => None,
        },
        Ok(_) => None,
        Err(e) => {
            warn!("Cannot read {:?}: {}", map_path, e);
            None
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
