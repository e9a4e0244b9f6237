//! Source file records and the names of the hash maps that hold them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Content hash and location of one source file.
///
/// The relative name is the key of the [`FileMap`] holding the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileRecord {
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "path")]
    pub absolute_path: String,
}

impl SourceFileRecord {
    pub fn new(content_hash: impl Into<String>, absolute_path: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            absolute_path: absolute_path.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.absolute_path)
    }
}

/// Relative name to record, ordered so persisted maps diff cleanly.
pub type FileMap = BTreeMap<String, SourceFileRecord>;

/// The three concurrent snapshots of every map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// What exists on disk right now.
    Input,
    /// What was last processed successfully.
    Output,
    /// What this run has to process.
    ToProcess,
}

impl Generation {
    pub const ALL: [Generation; 3] = [Generation::Input, Generation::Output, Generation::ToProcess];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Generation::Input => "input_maps",
            Generation::Output => "output_maps",
            Generation::ToProcess => "vect_maps",
        }
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

const PDF_MAP_SUFFIX: &str = "_pdf_map";
const JSON_MAP_SUFFIX: &str = "_json_map";
const MANUAL_MAP: &str = "pdf_man_map";

/// Name of one persisted map: one per scraped site and file kind, plus one
/// for manual uploads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapName {
    SitePdf(String),
    SiteJson(String),
    ManualPdf,
}

impl MapName {
    pub fn file_stem(&self) -> String {
        match self {
            MapName::SitePdf(site) => format!("{}{}", site, PDF_MAP_SUFFIX),
            MapName::SiteJson(site) => format!("{}{}", site, JSON_MAP_SUFFIX),
            MapName::ManualPdf => MANUAL_MAP.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }

    /// Parse a map file stem back into a name.
    pub fn from_stem(stem: &str) -> Option<Self> {
        if stem == MANUAL_MAP {
            return Some(MapName::ManualPdf);
        }
        if let Some(site) = stem.strip_suffix(PDF_MAP_SUFFIX) {
            return (!site.is_empty()).then(|| MapName::SitePdf(site.to_string()));
        }
        if let Some(site) = stem.strip_suffix(JSON_MAP_SUFFIX) {
            return (!site.is_empty()).then(|| MapName::SiteJson(site.to_string()));
        }
        None
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(".json").and_then(Self::from_stem)
    }

    pub fn site(&self) -> Option<&str> {
        match self {
            MapName::SitePdf(site) | MapName::SiteJson(site) => Some(site),
            MapName::ManualPdf => None,
        }
    }
}

impl std::fmt::Display for MapName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_stem())
    }
}

/// What kind of source a file is, decided once at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Scraped page stored as JSON under a site directory.
    WebPage,
    /// PDF downloaded by the scraper.
    ScrapedPdf,
    /// PDF uploaded by hand.
    ManualPdf,
    /// Course syllabus PDF uploaded by hand.
    Syllabus,
}

impl SourceKind {
    /// Anything living under a scraped site.
    pub fn is_web_page(&self) -> bool {
        matches!(self, SourceKind::WebPage | SourceKind::ScrapedPdf)
    }

    pub fn is_pdf_scraped(&self) -> bool {
        matches!(self, SourceKind::ScrapedPdf)
    }

    pub fn is_syllabus(&self) -> bool {
        matches!(self, SourceKind::Syllabus)
    }

    /// Decide the kind of a file from the map it belongs to and its path
    /// relative to the map's source root.
    pub fn classify(map: &MapName, relative_path: &Path) -> Self {
        match map {
            MapName::SiteJson(_) => SourceKind::WebPage,
            MapName::SitePdf(_) => SourceKind::ScrapedPdf,
            MapName::ManualPdf => {
                // Directory or file name, matched as a substring.
                let mentions_syllabus = relative_path.components().any(|c| {
                    c.as_os_str()
                        .to_string_lossy()
                        .to_lowercase()
                        .contains("syllabus")
                });

                if mentions_syllabus {
                    SourceKind::Syllabus
                } else {
                    SourceKind::ManualPdf
                }
            }
        }
    }

    /// Kind of a file found outside every configured source root, judged by
    /// its path alone: a `syllabus` segment wins, then anything below a
    /// `data_sites` segment is scraped, everything else counts as manual.
    pub fn infer_from_path(path: &Path) -> Self {
        let segments: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if segments.iter().any(|s| s == "syllabus") {
            return SourceKind::Syllabus;
        }
        if segments.iter().any(|s| s == "data_sites") {
            let is_pdf = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            return if is_pdf {
                SourceKind::ScrapedPdf
            } else {
                SourceKind::WebPage
            };
        }
        SourceKind::ManualPdf
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::WebPage => "web_page",
            SourceKind::ScrapedPdf => "pdf_scraped",
            SourceKind::ManualPdf => "pdf_manual",
            SourceKind::Syllabus => "syllabus",
        };
        write!(f, "{}", s)
    }
}

/// One file the pipeline has to process this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub map: MapName,
    pub relative_name: String,
    pub record: SourceFileRecord,
    pub kind: SourceKind,
}

impl WorkItem {
    pub fn path(&self) -> PathBuf {
        self.record.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_as_hash_and_path() {
        let record = SourceFileRecord::new("h1", "/x/a.pdf");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, serde_json::json!({"hash": "h1", "path": "/x/a.pdf"}));
    }

    #[test]
    fn test_map_name_roundtrip() {
        let names = [
            MapName::SitePdf("polytech".into()),
            MapName::SiteJson("scraped_bde".into()),
            MapName::ManualPdf,
        ];
        for name in names {
            assert_eq!(MapName::from_file_name(&name.file_name()), Some(name.clone()));
        }
        assert_eq!(MapName::from_stem("notes"), None);
        assert_eq!(MapName::from_stem("_pdf_map"), None);
        assert_eq!(
            MapName::from_stem("pdf_man_pdf_map"),
            Some(MapName::SitePdf("pdf_man".into()))
        );
    }

    #[test]
    fn test_source_kind_classification() {
        let site_json = MapName::SiteJson("site".into());
        let site_pdf = MapName::SitePdf("site".into());
        assert_eq!(SourceKind::classify(&site_json, Path::new("page.json")), SourceKind::WebPage);
        assert_eq!(SourceKind::classify(&site_pdf, Path::new("ROB/a.pdf")), SourceKind::ScrapedPdf);

        let manual = MapName::ManualPdf;
        assert_eq!(
            SourceKind::classify(&manual, Path::new("MAIN/charte.pdf")),
            SourceKind::ManualPdf
        );
        assert_eq!(
            SourceKind::classify(&manual, Path::new("MAIN/syllabus_MAIN.pdf")),
            SourceKind::Syllabus
        );
        assert_eq!(
            SourceKind::classify(&manual, Path::new("syllabus/ROB/plan.pdf")),
            SourceKind::Syllabus
        );
        assert_eq!(
            SourceKind::classify(&manual, Path::new("Syllabus_2024/ROB/plan.pdf")),
            SourceKind::Syllabus
        );
    }

    #[test]
    fn test_infer_from_path() {
        assert_eq!(
            SourceKind::infer_from_path(Path::new("/c/data_sites/s/json_scrapes/p.json")),
            SourceKind::WebPage
        );
        assert_eq!(
            SourceKind::infer_from_path(Path::new("/c/data_sites/s/pdf_scrapes/a.PDF")),
            SourceKind::ScrapedPdf
        );
        assert_eq!(
            SourceKind::infer_from_path(Path::new("/c/data_sites/syllabus/a.pdf")),
            SourceKind::Syllabus
        );
        assert_eq!(
            SourceKind::infer_from_path(Path::new("/tmp/upload.pdf")),
            SourceKind::ManualPdf
        );
    }

    #[test]
    fn test_source_kind_flags() {
        assert!(SourceKind::ScrapedPdf.is_web_page());
        assert!(SourceKind::ScrapedPdf.is_pdf_scraped());
        assert!(SourceKind::WebPage.is_web_page());
        assert!(!SourceKind::WebPage.is_pdf_scraped());
        assert!(!SourceKind::Syllabus.is_web_page());
        assert!(SourceKind::Syllabus.is_syllabus());
    }
}
