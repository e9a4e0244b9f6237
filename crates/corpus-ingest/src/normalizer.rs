//! Source-specific mappings into the canonical document shape.

use crate::error::{IngestError, IngestResult};
use crate::extract::ExtractedPdf;
use corpus_core::{CanonicalDocument, DocumentType, SourceInfo, UNTITLED};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

/// Metadata fields the filler is asked for on manual uploads.
pub const METADATA_FIELDS: [&str; 8] = [
    "title",
    "secteur",
    "date",
    "auteurs",
    "encadrant",
    "niveau",
    "annee",
    "specialite",
];

/// Placeholder for a PDF whose location was lost on the way.
pub const UNKNOWN_PATH: &str = "chemin inconnu";

const SCRAPED_DIR_PREFIX: &str = "scraped_";

fn str_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

/// Map one scraped web page record. Returns `None` when it has no content.
pub fn normalize_web_entry(
    raw: &Value,
    chemin_local: &str,
    site_name: &str,
) -> Option<CanonicalDocument> {
    let content = str_field(raw, "content").unwrap_or("");
    if content.trim().is_empty() {
        return None;
    }

    let title = str_field(raw, "title")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(UNTITLED);

    let source = SourceInfo {
        category: Some("scrapping".to_string()),
        chemin_local: chemin_local.to_string(),
        url: str_field(raw, "url").map(str::to_string),
        site: Some(str_field(raw, "site").unwrap_or(site_name).to_string()),
    };

    Some(
        CanonicalDocument::new(DocumentType::PageWeb, content)
            .with_metadata("title", title)
            .with_source(source),
    )
}

/// Site name of a page stored under `<site>/json_scrapes/`.
pub fn site_name_for(path: &Path) -> String {
    let site_dir = path
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    site_dir
        .strip_prefix(SCRAPED_DIR_PREFIX)
        .map(str::to_string)
        .unwrap_or(site_dir)
}

/// Read the raw record of a scraped page file. A file holding a list uses
/// its first record; an empty list reads as nothing.
pub fn read_web_record(path: &Path) -> IngestResult<Option<Value>> {
    if !path.exists() {
        return Err(IngestError::FileNotFound(path.to_path_buf()));
    }

    let text = std::fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&text).map_err(|e| IngestError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    match raw {
        Value::Array(mut items) => {
            if items.is_empty() {
                warn!("Empty page list in {:?}", path);
                return Ok(None);
            }
            Ok(Some(items.swap_remove(0)))
        }
        other => Ok(Some(other)),
    }
}

/// Read a scraped page file and normalize it.
pub fn load_web_page(path: &Path) -> IngestResult<Option<CanonicalDocument>> {
    let Some(record) = read_web_record(path)? else {
        return Ok(None);
    };
    let doc = normalize_web_entry(&record, &path.to_string_lossy(), &site_name_for(path));
    debug!("Normalized web page {:?}: {}", path, doc.is_some());
    Ok(doc)
}

fn meta_str(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn pdf_source(pdf: &ExtractedPdf, site: Option<String>) -> SourceInfo {
    let chemin_local = if pdf.pdf_path.is_empty() {
        UNKNOWN_PATH.to_string()
    } else {
        pdf.pdf_path.clone()
    };
    SourceInfo {
        category: None,
        chemin_local,
        url: meta_str(&pdf.metadata, "url"),
        site,
    }
}

/// Map a scraped PDF. Its metadata comes from the scraper's own guesses and
/// `pdf_map.json`, without any model call.
pub fn normalize_scraped_pdf(pdf: &ExtractedPdf) -> CanonicalDocument {
    let meta = &pdf.metadata;
    let title = meta_str(meta, "title_2")
        .or_else(|| meta_str(meta, "title"))
        .unwrap_or_default();
    let date = meta_str(meta, "last_modified").or_else(|| meta_str(meta, "date"));
    let auteurs = meta
        .get("auteurs")
        .filter(|v| v.is_array())
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let site = (!pdf.source.is_empty()).then(|| pdf.source.clone());
    let mut doc = CanonicalDocument::new(DocumentType::PdfScraped, pdf.content.clone())
        .with_source(pdf_source(pdf, site))
        .with_metadata("title", title)
        .with_metadata(
            "secteur",
            meta_str(meta, "secteur").map(Value::String).unwrap_or(Value::Null),
        )
        .with_metadata("date", date.map(Value::String).unwrap_or(Value::Null))
        .with_metadata("auteurs", auteurs);
    doc.metadata.retain(|_, v| !v.is_null());
    doc
}

/// Map a manually uploaded PDF. Metadata is left empty for the filler.
pub fn normalize_manual_pdf(pdf: &ExtractedPdf) -> CanonicalDocument {
    let site = (!pdf.source.is_empty()).then(|| pdf.source.clone());
    CanonicalDocument::new(DocumentType::PdfManual, pdf.content.clone())
        .with_source(pdf_source(pdf, site))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extracted(metadata: Value) -> ExtractedPdf {
        ExtractedPdf {
            source: "polytech".into(),
            file_name: "plan.pdf".into(),
            pdf_path: "/corpus/data_sites/polytech/pdf_scrapes/plan.pdf".into(),
            specialty: "NA".into(),
            content: "Plan du campus".into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_web_entry_defaults() {
        let raw = json!({"url": "https://x.fr/a", "content": "Bienvenue"});
        let doc = normalize_web_entry(&raw, "/c/a.json", "polytech").unwrap();

        assert_eq!(doc.document_type, DocumentType::PageWeb);
        assert_eq!(doc.title(), Some(UNTITLED));
        assert_eq!(doc.source.category.as_deref(), Some("scrapping"));
        assert_eq!(doc.source.site.as_deref(), Some("polytech"));
        assert_eq!(doc.source.url.as_deref(), Some("https://x.fr/a"));
        assert!(doc.tags.is_empty());
        assert!(doc.type_specific.is_empty());
    }

    #[test]
    fn test_web_entry_without_content() {
        let raw = json!({"title": "Vide", "content": "   "});
        assert!(normalize_web_entry(&raw, "/c/a.json", "s").is_none());
    }

    #[test]
    fn test_site_name_strips_prefix() {
        assert_eq!(
            site_name_for(Path::new("/c/data_sites/scraped_bde/json_scrapes/p.json")),
            "bde"
        );
        assert_eq!(
            site_name_for(Path::new("/c/data_sites/polytech/json_scrapes/p.json")),
            "polytech"
        );
    }

    #[test]
    fn test_load_web_page_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bde/json_scrapes/p.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"[{"title": "Accueil", "content": "Bonjour"}, {"content": "ignored"}]"#,
        )
        .unwrap();

        let doc = load_web_page(&path).unwrap().unwrap();
        assert_eq!(doc.title(), Some("Accueil"));
        assert_eq!(doc.content, "Bonjour");
        assert_eq!(doc.source.site.as_deref(), Some("bde"));
    }

    #[test]
    fn test_load_web_page_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_web_page(&path),
            Err(IngestError::ParseError { .. })
        ));
    }

    #[test]
    fn test_scraped_pdf_prefers_site_map() {
        let doc = normalize_scraped_pdf(&extracted(json!({
            "title": "guessed",
            "title_2": "Plan du campus",
            "secteur": "ROB",
            "last_modified": "2024-01-02",
            "date": "2020",
            "auteurs": ["A"],
            "url": "https://x.fr/plan.pdf"
        })));

        assert_eq!(doc.document_type, DocumentType::PdfScraped);
        assert_eq!(doc.title(), Some("Plan du campus"));
        assert_eq!(doc.metadata["secteur"], "ROB");
        assert_eq!(doc.metadata["date"], "2024-01-02");
        assert_eq!(doc.metadata["auteurs"], json!(["A"]));
        assert_eq!(doc.source.site.as_deref(), Some("polytech"));
        assert_eq!(doc.source.url.as_deref(), Some("https://x.fr/plan.pdf"));
    }

    #[test]
    fn test_scraped_pdf_falls_back_to_guesses() {
        let doc = normalize_scraped_pdf(&extracted(json!({"title": "guessed", "date": "2020"})));
        assert_eq!(doc.title(), Some("guessed"));
        assert_eq!(doc.metadata["date"], "2020");
        assert!(!doc.metadata.contains_key("secteur"));
    }

    #[test]
    fn test_manual_pdf_has_no_metadata() {
        let mut pdf = extracted(json!({"title": "guessed"}));
        pdf.pdf_path.clear();
        let doc = normalize_manual_pdf(&pdf);
        assert_eq!(doc.document_type, DocumentType::PdfManual);
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.source.chemin_local, UNKNOWN_PATH);
    }
}
