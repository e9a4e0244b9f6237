//! Core document types for the corpus normalizer.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Title used when a scraped page carries none.
pub const UNTITLED: &str = "Sans titre";

/// Category of a canonical document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PageWeb,
    Cours,
    Administratif,
    Specialite,
    Projet,
    Infrastructure,
    VieEtudiante,
    PdfScraped,
    #[serde(rename = "pdf_ajouté_manuellement")]
    PdfManual,
}

impl DocumentType {
    /// Every document type accepted by the schema.
    pub const ALL: [DocumentType; 9] = [
        DocumentType::PageWeb,
        DocumentType::Cours,
        DocumentType::Administratif,
        DocumentType::Specialite,
        DocumentType::Projet,
        DocumentType::Infrastructure,
        DocumentType::VieEtudiante,
        DocumentType::PdfScraped,
        DocumentType::PdfManual,
    ];

    /// The closed set a classifier is allowed to answer with.
    pub const CLASSIFIABLE: [DocumentType; 6] = [
        DocumentType::Cours,
        DocumentType::Projet,
        DocumentType::Administratif,
        DocumentType::Specialite,
        DocumentType::VieEtudiante,
        DocumentType::Infrastructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::PageWeb => "page_web",
            DocumentType::Cours => "cours",
            DocumentType::Administratif => "administratif",
            DocumentType::Specialite => "specialite",
            DocumentType::Projet => "projet",
            DocumentType::Infrastructure => "infrastructure",
            DocumentType::VieEtudiante => "vie_etudiante",
            DocumentType::PdfScraped => "pdf_scraped",
            DocumentType::PdfManual => "pdf_ajouté_manuellement",
        }
    }

    /// Whether a classifier may return this type.
    pub fn is_classifiable(&self) -> bool {
        Self::CLASSIFIABLE.contains(self)
    }

    /// Extra fields and the prompt template that fills them, for the types
    /// that define any.
    pub fn type_specific_fields(&self) -> Option<(&'static [&'static str], &'static str)> {
        match self {
            DocumentType::Cours => Some((
                &["logiciels", "thematique", "resume"],
                "cours/cours_fields.txt",
            )),
            DocumentType::Administratif => Some((
                &["service", "contact"],
                "administratif/administratif_fields.txt",
            )),
            DocumentType::Specialite => Some((
                &["departement", "responsable", "description"],
                "specialite/specialite_fields.txt",
            )),
            DocumentType::Projet => Some((&["client", "livrable", "techno"], "projet/projet.txt")),
            DocumentType::Infrastructure => Some((
                &["adresse", "transports"],
                "infrastructure/infrastructure_fields.txt",
            )),
            DocumentType::VieEtudiante => Some((
                &["activites", "lieux", "evenements"],
                "vie_etudiante/vie_etudiante_fields.txt",
            )),
            DocumentType::PageWeb | DocumentType::PdfScraped | DocumentType::PdfManual => None,
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("unknown document type: {}", s)))
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a document came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub chemin_local: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
}

/// The uniform document shape every source is normalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub document_type: DocumentType,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub source: SourceInfo,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub type_specific: Map<String, Value>,
}

impl CanonicalDocument {
    pub fn new(document_type: DocumentType, content: impl Into<String>) -> Self {
        Self {
            document_type,
            metadata: Map::new(),
            source: SourceInfo::default(),
            content: content.into(),
            tags: Vec::new(),
            type_specific: Map::new(),
        }
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = source;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }

    /// Flatten the document into the `key -> string` mapping a vector store
    /// accepts as metadata. Nested objects become `parent.child`, lists are
    /// joined with `", "` and the content itself is left out.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        let value = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => return flat,
        };

        for (key, value) in value {
            if key == "content" {
                continue;
            }
            match value {
                Value::Object(inner) => {
                    for (sub_key, sub_value) in inner {
                        flat.insert(format!("{}.{}", key, sub_key), scalar_string(&sub_value));
                    }
                }
                other => {
                    flat.insert(key, scalar_string(&other));
                }
            }
        }

        flat
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(scalar_string)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// One line of a syllabus table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub code: String,
    pub title: String,
    /// Zero when the line carried no page number.
    pub page: u32,
}

/// One course sheet of a syllabus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSection {
    pub code: String,
    pub title: String,
    pub content: String,
}

/// Structure extracted from a syllabus PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusStructure {
    pub syllabus: String,
    pub specialite: String,
    #[serde(default)]
    pub toc: Vec<TocEntry>,
    #[serde(default)]
    pub courses: Vec<CourseSection>,
}

impl SyllabusStructure {
    /// A syllabus is valid as soon as it names its specialty.
    pub fn is_valid(&self) -> bool {
        !self.specialite.trim().is_empty()
    }
}

/// Terminal state a file reached in the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Valid,
    Rejected,
    Errored,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Valid => "valid",
            Disposition::Rejected => "rejected",
            Disposition::Errored => "errored",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counts reported at the end of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub valid: usize,
    pub rejected: usize,
    pub errored: usize,
}

impl BatchSummary {
    pub fn record(&mut self, disposition: Disposition) {
        self.processed += 1;
        match disposition {
            Disposition::Valid => self.valid += 1,
            Disposition::Rejected => self.rejected += 1,
            Disposition::Errored => self.errored += 1,
        }
    }
}

/// Status string of the progress file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Idle,
    Running,
    Completed,
}

/// Shape of `progress.json`, polled by external progress UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub current: usize,
    pub total: usize,
    pub status: ProgressStatus,
}

impl ProgressReport {
    pub fn new(total: usize) -> Self {
        Self {
            current: 0,
            total,
            status: if total == 0 {
                ProgressStatus::Idle
            } else {
                ProgressStatus::Running
            },
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.current as f64 * 100.0 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_type_serde_names() {
        let value = serde_json::to_value(DocumentType::PdfManual).unwrap();
        assert_eq!(value, json!("pdf_ajouté_manuellement"));

        let parsed: DocumentType = serde_json::from_value(json!("vie_etudiante")).unwrap();
        assert_eq!(parsed, DocumentType::VieEtudiante);

        for t in DocumentType::ALL {
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }

    #[test]
    fn test_document_type_from_str() {
        assert_eq!("  Cours ".parse::<DocumentType>().unwrap(), DocumentType::Cours);
        assert!("syllabus".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_classifiable_subset() {
        assert!(DocumentType::Projet.is_classifiable());
        assert!(!DocumentType::PageWeb.is_classifiable());
        assert!(!DocumentType::PdfManual.is_classifiable());
        for t in DocumentType::CLASSIFIABLE {
            assert!(t.type_specific_fields().is_some());
        }
    }

    #[test]
    fn test_flatten() {
        let doc = CanonicalDocument::new(DocumentType::PageWeb, "body text")
            .with_metadata("title", "Accueil")
            .with_source(SourceInfo {
                category: Some("scrapping".into()),
                chemin_local: "/corpus/a.json".into(),
                url: None,
                site: Some("polytech".into()),
            });
        let mut doc = doc;
        doc.tags = vec!["a".into(), "b".into()];

        let flat = doc.flatten();
        assert_eq!(flat.get("metadata.title").unwrap(), "Accueil");
        assert_eq!(flat.get("source.site").unwrap(), "polytech");
        assert_eq!(flat.get("source.url").unwrap(), "");
        assert_eq!(flat.get("tags").unwrap(), "a, b");
        assert_eq!(flat.get("document_type").unwrap(), "page_web");
        assert!(!flat.contains_key("content"));
    }

    #[test]
    fn test_syllabus_validity() {
        let mut s = SyllabusStructure {
            syllabus: "/x/ROB/syllabus_ROB.pdf".into(),
            specialite: "ROB".into(),
            toc: vec![],
            courses: vec![],
        };
        assert!(s.is_valid());
        s.specialite = "   ".into();
        assert!(!s.is_valid());
    }

    #[test]
    fn test_batch_summary() {
        let mut summary = BatchSummary::default();
        summary.record(Disposition::Valid);
        summary.record(Disposition::Errored);
        summary.record(Disposition::Rejected);
        summary.record(Disposition::Valid);
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.errored, 1);
    }

    #[test]
    fn test_progress_report_shape() {
        let report = ProgressReport::new(3);
        let value = serde_json::to_value(report).unwrap();
        assert_eq!(value, json!({"current": 0, "total": 3, "status": "running"}));
        assert_eq!(ProgressReport::new(0).status, ProgressStatus::Idle);
    }
}
