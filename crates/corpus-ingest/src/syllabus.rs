//! Syllabus PDFs: table of contents and course sheets, then chunking into
//! small canonical documents for retrieval.

use crate::error::{IngestError, IngestResult};
use crate::extract::TextExtractor;
use corpus_core::{
    CanonicalDocument, CourseSection, DocumentType, SourceInfo, SyllabusStructure, TocEntry,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const TOC_MARKER: &str = "Syllabus des enseignements";
const COURSE_MARKER: &str = "Fiche Syllabus";
const MANUAL_CATEGORY: &str = "pdf_ajouté_manuellement";

/// Page header and footer lines that leak into the table of contents.
const FOOTER_PATTERNS: [&str; 7] = [
    "Polytech Sorbonne",
    "Bâtiment Esclangon",
    "Tél :",
    "Fax :",
    "email :",
    "http://",
    "Case Courrier",
];

const INFO_SECTIONS: [&str; 4] = ["UE", "Spécialité", "Volume horaire", "Crédits"];

lazy_static! {
    static ref TOC_WITH_PAGE: Regex =
        Regex::new(r"(EPU-[A-Z0-9\-]+)\s*-\s*([^\.]+?)(?:\.{2,}|\s{3,})\s*(\d+)(?:\s|$)").unwrap();
    static ref TOC_WITHOUT_PAGE: Regex = Regex::new(r"(EPU-[A-Z0-9\-]+)\s*-\s*(.+)").unwrap();
    static ref COURSE_HEADER: Regex = Regex::new(r"(EPU-[A-Z0-9\-]+)\s*-\s*(.+?)\n").unwrap();
    static ref SEMESTER: Regex = Regex::new(r"EPU-[A-Z](\d)-").unwrap();
    static ref OBJECTIVES: Regex =
        Regex::new(r"(?is)(?:compétences|objectifs).*?\n(.*?)(?:Prérequis|Programme)").unwrap();
    static ref PROGRAMME: Regex =
        Regex::new(r"(?is)(?:Programme|Contenu).*?\n(.*?)(?:Prérequis|Compétences|Évaluation)")
            .unwrap();
    static ref INFO_HEADINGS: Vec<(&'static str, Regex)> = INFO_SECTIONS
        .iter()
        .map(|section| {
            let heading = Regex::new(&format!("(?i){}", regex::escape(section))).unwrap();
            (*section, heading)
        })
        .collect();
}

fn parse_toc_line(line: &str) -> Option<TocEntry> {
    if let Some(caps) = TOC_WITH_PAGE.captures(line) {
        return Some(TocEntry {
            code: caps[1].to_string(),
            title: caps[2].trim().to_string(),
            page: caps[3].parse().unwrap_or(0),
        });
    }
    TOC_WITHOUT_PAGE.captures(line).map(|caps| TocEntry {
        code: caps[1].to_string(),
        title: caps[2].trim().to_string(),
        page: 0,
    })
}

/// Split raw syllabus text into its table of contents and course sheets.
///
/// The table of contents runs from the second `Syllabus des enseignements`
/// (the first is the cover page) to the first `Fiche Syllabus`.
pub fn extract_toc_and_courses(text: &str) -> IngestResult<(Vec<TocEntry>, Vec<CourseSection>)> {
    let starts: Vec<_> = text.match_indices(TOC_MARKER).collect();
    let toc_start = match starts.as_slice() {
        [] => {
            return Err(IngestError::SyllabusFormat(format!(
                "table of contents start not found ('{}')",
                TOC_MARKER
            )))
        }
        [only] => only.0 + TOC_MARKER.len(),
        [_, second, ..] => second.0 + TOC_MARKER.len(),
    };
    let toc_end = text.find(COURSE_MARKER).ok_or_else(|| {
        IngestError::SyllabusFormat(format!(
            "table of contents end not found ('{}')",
            COURSE_MARKER
        ))
    })?;

    let toc_text = if toc_end > toc_start {
        &text[toc_start..toc_end]
    } else {
        ""
    };

    let mut toc = Vec::new();
    let mut seen = HashSet::new();
    for line in toc_text.lines().map(str::trim) {
        if line.is_empty() || FOOTER_PATTERNS.iter().any(|p| line.contains(p)) {
            continue;
        }
        if let Some(entry) = parse_toc_line(line) {
            if seen.insert(entry.code.clone()) {
                toc.push(entry);
            }
        }
    }

    let courses_text = &text[toc_end..];
    let sheet_starts: Vec<usize> = courses_text
        .match_indices(COURSE_MARKER)
        .map(|(i, _)| i)
        .collect();

    let mut courses = Vec::new();
    let mut seen = HashSet::new();
    for (i, &start) in sheet_starts.iter().enumerate() {
        let end = sheet_starts
            .get(i + 1)
            .copied()
            .unwrap_or(courses_text.len());
        let sheet = &courses_text[start..end];

        let Some(caps) = COURSE_HEADER.captures(sheet) else {
            continue;
        };
        let code = caps[1].to_string();
        if !seen.insert(code.clone()) {
            continue;
        }
        courses.push(CourseSection {
            code,
            title: caps[2].trim().to_string(),
            content: sheet.trim().to_string(),
        });
    }

    debug!("Syllabus: {} TOC entries, {} courses", toc.len(), courses.len());
    Ok((toc, courses))
}

/// Read a syllabus PDF. The specialty is the name of its directory.
pub fn extract_syllabus_structure(
    extractor: &dyn TextExtractor,
    path: &Path,
) -> IngestResult<SyllabusStructure> {
    let specialite = path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let text = extractor.extract_text(path)?;
    let (toc, courses) = extract_toc_and_courses(&text)?;

    info!(
        "Extracted syllabus {:?} ({}): {} courses",
        path,
        specialite,
        courses.len()
    );
    Ok(SyllabusStructure {
        syllabus: path.to_string_lossy().into_owned(),
        specialite,
        toc,
        courses,
    })
}

fn semester_of(code: &str) -> Option<String> {
    SEMESTER.captures(code).map(|caps| caps[1].to_string())
}

fn semester_name(semester: &str) -> String {
    if semester == "0" {
        "Stages et fin d'études".to_string()
    } else {
        format!("Semestre {}", semester)
    }
}

fn chunk(
    structure: &SyllabusStructure,
    content: String,
    metadata: Vec<(&str, String)>,
    tags: Vec<String>,
) -> CanonicalDocument {
    let mut doc = CanonicalDocument::new(DocumentType::Cours, content).with_source(SourceInfo {
        category: Some(MANUAL_CATEGORY.to_string()),
        chemin_local: structure.syllabus.clone(),
        url: None,
        site: Some(structure.specialite.clone()),
    });
    for (key, value) in metadata {
        doc.metadata.insert(key.to_string(), Value::String(value));
    }
    doc.tags = tags;
    doc
}

/// General information block: each known heading up to its next repeat.
fn general_info(content: &str, title: &str, code: &str) -> String {
    let mut text = format!("# {} ({})\n\n", title, code);

    for (section, heading) in INFO_HEADINGS.iter() {
        let Some(found) = heading.find(content) else {
            continue;
        };
        let Some(colon) = content[found.end()..].find(':') else {
            continue;
        };
        let value_start = found.end() + colon + 1;
        let value_end = heading
            .find_at(content, value_start)
            .map(|m| m.start())
            .unwrap_or(content.len());
        text.push_str(&format!(
            "**{}**: {}\n\n",
            section,
            content[value_start..value_end].trim()
        ));
    }

    text
}

fn capture_block(pattern: &Regex, content: &str) -> Option<String> {
    pattern
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn chunk_course(structure: &SyllabusStructure, course: &CourseSection) -> Vec<CanonicalDocument> {
    let semester = semester_of(&course.code).unwrap_or_else(|| "0".to_string());
    let tags = vec![
        "cours".to_string(),
        "syllabus".to_string(),
        format!("semestre-{}", semester),
        structure.specialite.clone(),
        course.title.clone(),
    ];
    let metadata = |section: &str| {
        vec![
            ("title", course.title.clone()),
            ("code", course.code.clone()),
            ("type", "fiche_cours".to_string()),
            ("section", section.to_string()),
            ("specialite", structure.specialite.clone()),
            ("secteur", structure.specialite.clone()),
            ("niveau", format!("Semestre {}", semester)),
        ]
    };

    let mut docs = vec![chunk(
        structure,
        general_info(&course.content, &course.title, &course.code),
        metadata("information_generale"),
        tags.clone(),
    )];

    if let Some(objectives) = capture_block(&OBJECTIVES, &course.content) {
        docs.push(chunk(
            structure,
            format!(
                "# Objectifs pédagogiques - {} ({})\n\n{}",
                course.title, course.code, objectives
            ),
            metadata("objectifs"),
            tags.clone(),
        ));
    }

    if let Some(programme) = capture_block(&PROGRAMME, &course.content) {
        docs.push(chunk(
            structure,
            format!("# Programme - {} ({})\n\n{}", course.title, course.code, programme),
            metadata("programme"),
            tags,
        ));
    }

    docs
}

/// Split a syllabus into one table-of-contents document per semester, then
/// information, objectives and programme documents per course. A course
/// code seen twice is only chunked once.
pub fn chunk_syllabus(structure: &SyllabusStructure) -> Vec<CanonicalDocument> {
    let mut semesters: Vec<(String, Vec<&TocEntry>)> = Vec::new();
    for entry in &structure.toc {
        let Some(semester) = semester_of(&entry.code) else {
            continue;
        };
        match semesters.iter_mut().find(|(s, _)| *s == semester) {
            Some((_, entries)) => entries.push(entry),
            None => semesters.push((semester, vec![entry])),
        }
    }

    let mut docs = Vec::new();
    for (semester, entries) in &semesters {
        let name = semester_name(semester);
        let mut content = format!("# Table des matières - {}\n\n", name);
        for entry in entries {
            content.push_str(&format!("- {} : {}\n", entry.code, entry.title));
        }
        docs.push(chunk(
            structure,
            content,
            vec![
                ("title", format!("Table des matières - {}", name)),
                ("type", "toc".to_string()),
                ("specialite", structure.specialite.clone()),
                ("secteur", structure.specialite.clone()),
                ("niveau", format!("Semestre {}", semester)),
            ],
            vec![
                "toc".to_string(),
                "syllabus".to_string(),
                format!("semestre-{}", semester),
                structure.specialite.clone(),
            ],
        ));
    }

    let mut seen = HashSet::new();
    for course in &structure.courses {
        if !seen.insert(course.code.as_str()) {
            debug!("Skipping duplicate course {}", course.code);
            continue;
        }
        docs.extend(chunk_course(structure, course));
    }

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Syllabus des enseignements\nCouverture\n\
Syllabus des enseignements\n\
EPU-R5-IRB - Robotique de base ........ 12\n\
Polytech Sorbonne - Case Courrier 4\n\
EPU-R6-ASV - Asservissement\n\
EPU-R5-IRB - Robotique de base ........ 12\n\
EPU-R0-STG - Stage ingénieur      40\n\
Fiche Syllabus\n\
EPU-R5-IRB - Robotique de base\n\
UE : Robotique\n\
Volume horaire : 40h\n\
Objectifs :\n\
Comprendre les robots\n\
Programme :\n\
Cinématique\n\
Évaluation : examen\n\
Fiche Syllabus\n\
EPU-R5-IRB - Robotique de base\n\
doublon\n\
Fiche Syllabus\n\
EPU-R6-ASV - Asservissement\n\
Contenu sans suite\n";

    fn structure() -> SyllabusStructure {
        let (toc, courses) = extract_toc_and_courses(SAMPLE).unwrap();
        SyllabusStructure {
            syllabus: "/c/pdf_man/syllabus/ROB/syllabus_ROB.pdf".into(),
            specialite: "ROB".into(),
            toc,
            courses,
        }
    }

    #[test]
    fn test_toc_entries() {
        let s = structure();
        let codes: Vec<_> = s.toc.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["EPU-R5-IRB", "EPU-R6-ASV", "EPU-R0-STG"]);
        assert_eq!(s.toc[0].title, "Robotique de base");
        assert_eq!(s.toc[0].page, 12);
        assert_eq!(s.toc[1].page, 0);
        assert_eq!(s.toc[2].page, 40);
    }

    #[test]
    fn test_courses_dedupe_first_wins() {
        let s = structure();
        assert_eq!(s.courses.len(), 2);
        assert_eq!(s.courses[0].code, "EPU-R5-IRB");
        assert!(s.courses[0].content.contains("Cinématique"));
        assert_eq!(s.courses[1].title, "Asservissement");
    }

    #[test]
    fn test_missing_markers() {
        assert!(matches!(
            extract_toc_and_courses("rien"),
            Err(IngestError::SyllabusFormat(_))
        ));
        assert!(matches!(
            extract_toc_and_courses("Syllabus des enseignements\nEPU-R5-A - A"),
            Err(IngestError::SyllabusFormat(_))
        ));
    }

    #[test]
    fn test_chunks() {
        let docs = chunk_syllabus(&structure());

        let tocs: Vec<_> = docs
            .iter()
            .filter(|d| d.metadata["type"] == "toc")
            .collect();
        assert_eq!(tocs.len(), 3);
        assert_eq!(tocs[0].title(), Some("Table des matières - Semestre 5"));
        assert!(tocs[2].content.contains("Stages et fin d'études"));

        let irb: Vec<_> = docs
            .iter()
            .filter(|d| d.metadata.get("code").and_then(Value::as_str) == Some("EPU-R5-IRB"))
            .collect();
        let sections: Vec<_> = irb
            .iter()
            .map(|d| d.metadata["section"].as_str().unwrap())
            .collect();
        assert_eq!(sections, vec!["information_generale", "objectifs", "programme"]);
        assert!(irb[0].content.contains("**Volume horaire**: 40h"));
        assert!(irb[1].content.contains("Comprendre les robots"));
        assert!(irb[2].content.contains("Cinématique"));
        assert_eq!(
            irb[0].tags,
            vec!["cours", "syllabus", "semestre-5", "ROB", "Robotique de base"]
        );

        for doc in &docs {
            assert_eq!(doc.document_type, DocumentType::Cours);
            assert_eq!(doc.source.category.as_deref(), Some(MANUAL_CATEGORY));
            assert_eq!(doc.source.site.as_deref(), Some("ROB"));
        }
    }

    #[test]
    fn test_chunking_skips_repeated_codes() {
        let mut s = structure();
        let first = s.courses[0].clone();
        s.courses.push(first);
        let before = chunk_syllabus(&structure()).len();
        assert_eq!(chunk_syllabus(&s).len(), before);
    }

    #[test]
    fn test_general_info_on_case_changing_text() {
        // Lowercasing shifts the byte offsets of these characters.
        let info = general_info("ẞẞ UE é: xİİ", "Robotique", "EPU-R5-IRB");
        assert!(info.contains("**UE**: xİİ"));

        let info = general_info(
            "İİ ue : Robots ẞ\nCRÉDITS: 4 UE suivante",
            "Robotique",
            "EPU-R5-IRB",
        );
        assert!(info.contains("**UE**: Robots ẞ\nCRÉDITS: 4"));
        assert!(info.contains("**Crédits**: 4 UE suivante"));
    }
}
