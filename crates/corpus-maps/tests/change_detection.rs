//! Change detection across successive runs over a real directory tree.

use corpus_core::{FileMap, Generation, MapName, SourceFileRecord, SourceKind};
use corpus_maps::{ChangeDetector, MapStore, SourceLayout};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Corpus {
    _dir: TempDir,
    root: PathBuf,
    detector: ChangeDetector,
}

impl Corpus {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let layout = SourceLayout::new(root.join("data_sites"), root.join("pdf_man"))
            .with_excluded_sites(&["archives".to_string()])
            .with_ignore_patterns(&["*.tmp".to_string()]);
        let detector = ChangeDetector::new(MapStore::new(root.join("maps")), layout);
        Self {
            _dir: dir,
            root,
            detector,
        }
    }

    fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn store(&self) -> &MapStore {
        self.detector.store()
    }

    /// One full run where every file processes successfully.
    fn run_all_succeed(&self) -> usize {
        let items = self.detector.prepare().unwrap();
        let mut processed: BTreeMap<MapName, FileMap> = BTreeMap::new();
        for item in &items {
            processed
                .entry(item.map.clone())
                .or_default()
                .insert(item.relative_name.clone(), item.record.clone());
        }
        self.detector.promote(&processed).unwrap();
        items.len()
    }
}

fn keys(map: &FileMap) -> Vec<&str> {
    map.keys().map(String::as_str).collect()
}

#[test]
fn second_run_without_changes_processes_nothing() {
    let corpus = Corpus::new();
    corpus.write("data_sites/bde/json_scrapes/page.json", br#"{"content": "x"}"#);
    corpus.write("data_sites/bde/pdf_scrapes/ROB/plan.pdf", b"%PDF-1");
    corpus.write("pdf_man/MAIN/charte.pdf", b"%PDF-2");

    assert_eq!(corpus.run_all_succeed(), 3);
    assert_eq!(corpus.run_all_succeed(), 0);

    let to_process = corpus
        .store()
        .load(Generation::ToProcess, &MapName::SitePdf("bde".into()));
    assert!(to_process.is_empty());
}

#[test]
fn modified_byte_is_reprocessed() {
    let corpus = Corpus::new();
    let pdf = corpus.write("pdf_man/a.pdf", b"%PDF-original");
    corpus.write("pdf_man/b.pdf", b"%PDF-other");
    corpus.run_all_succeed();

    std::fs::write(&pdf, b"%PDF-originaL").unwrap();
    let items = corpus.detector.prepare().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].relative_name, "a.pdf");
    assert_eq!(items[0].kind, SourceKind::ManualPdf);
}

#[test]
fn deleted_file_is_pruned_from_output_and_to_process() {
    let corpus = Corpus::new();
    let gone = corpus.write("data_sites/bde/json_scrapes/gone.json", b"{}");
    corpus.write("data_sites/bde/json_scrapes/kept.json", b"{\"a\": 1}");
    corpus.run_all_succeed();

    // Leave a to-process entry behind as if the previous batch was cut short.
    let name = MapName::SiteJson("bde".into());
    let mut pending = FileMap::new();
    pending.insert(
        "gone.json".into(),
        SourceFileRecord::new("h", gone.to_string_lossy()),
    );
    corpus
        .store()
        .save(Generation::ToProcess, &name, &pending)
        .unwrap();

    std::fs::remove_file(&gone).unwrap();
    let input = corpus.detector.scan_input().unwrap();
    let report = corpus.detector.prune_orphans(&input).unwrap();

    assert_eq!(report.entries, 2);
    assert_eq!(keys(&corpus.store().load(Generation::Output, &name)), vec!["kept.json"]);
    assert!(corpus.store().load(Generation::ToProcess, &name).is_empty());
}

#[test]
fn example_scenario_single_pdf() {
    let corpus = Corpus::new();
    let name = MapName::ManualPdf;
    let mut input = FileMap::new();
    input.insert("a.pdf".into(), SourceFileRecord::new("h1", "/x/a.pdf"));
    corpus.store().save(Generation::Output, &name, &FileMap::new()).unwrap();
    corpus.store().save(Generation::Input, &name, &input).unwrap();

    let inputs = BTreeMap::from([(name.clone(), input.clone())]);
    let to_process = corpus.detector.compute_to_process(&inputs).unwrap();
    assert_eq!(to_process[&name], input);

    corpus.detector.promote(&to_process).unwrap();
    assert_eq!(corpus.store().load(Generation::Output, &name), input);

    let next = corpus.detector.compute_to_process(&inputs).unwrap();
    assert!(next[&name].is_empty());
    assert!(corpus.store().load(Generation::ToProcess, &name).is_empty());
}

#[test]
fn only_credited_files_reach_output() {
    let corpus = Corpus::new();
    corpus.write("pdf_man/ok.pdf", b"%PDF-ok");
    corpus.write("pdf_man/bad.pdf", b"%PDF-bad");
    corpus.run_all_succeed();

    corpus.write("pdf_man/ok.pdf", b"%PDF-ok-2");
    corpus.write("pdf_man/bad.pdf", b"%PDF-bad-2");
    let items = corpus.detector.prepare().unwrap();
    assert_eq!(items.len(), 2);

    let mut credited = FileMap::new();
    for item in items.iter().filter(|i| i.relative_name == "ok.pdf") {
        credited.insert(item.relative_name.clone(), item.record.clone());
    }
    corpus
        .detector
        .promote(&BTreeMap::from([(MapName::ManualPdf, credited)]))
        .unwrap();

    // bad.pdf lost its stale output entry and comes back next run.
    let output = corpus.store().load(Generation::Output, &MapName::ManualPdf);
    assert_eq!(keys(&output), vec!["ok.pdf"]);
    let again = corpus.detector.prepare().unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].relative_name, "bad.pdf");
}

#[test]
fn archives_and_ignored_files_are_not_scanned() {
    let corpus = Corpus::new();
    corpus.write("data_sites/Archives/pdf_scrapes/old.pdf", b"%PDF");
    corpus.write("data_sites/bde/pdf_scrapes/part.pdf.tmp", b"%PDF");
    corpus.write("data_sites/bde/pdf_scrapes/notes.txt", b"text");
    corpus.write("data_sites/bde/pdf_scrapes/real.pdf", b"%PDF");

    let input = corpus.detector.scan_input().unwrap();
    assert!(!input.keys().any(|n| n.site() == Some("Archives")));
    assert_eq!(keys(&input[&MapName::SitePdf("bde".into())]), vec!["real.pdf"]);
}

#[test]
fn scan_bootstraps_output_maps() {
    let corpus = Corpus::new();
    corpus.write("data_sites/bde/json_scrapes/page.json", b"{}");

    corpus.detector.scan_input().unwrap();
    assert!(corpus
        .store()
        .exists(Generation::Output, &MapName::SiteJson("bde".into())));
    assert!(corpus.store().exists(Generation::Output, &MapName::ManualPdf));
    assert!(!corpus
        .store()
        .exists(Generation::Output, &MapName::SitePdf("bde".into())));
}

#[test]
fn removed_site_maps_are_deleted() {
    let corpus = Corpus::new();
    corpus.write("data_sites/old/json_scrapes/page.json", b"{}");
    corpus.write("data_sites/new/json_scrapes/page.json", b"{}");
    corpus.run_all_succeed();

    std::fs::remove_dir_all(corpus.root.join("data_sites/old")).unwrap();
    let input = corpus.detector.scan_input().unwrap();
    let report = corpus.detector.prune_orphans(&input).unwrap();

    let old = MapName::SiteJson("old".into());
    assert!(report.map_files >= 1);
    for generation in Generation::ALL {
        assert!(!corpus.store().exists(generation, &old), "{}", generation);
    }
    assert!(corpus
        .store()
        .exists(Generation::Output, &MapName::SiteJson("new".into())));
}

#[test]
fn syllabus_files_are_tagged_at_scan_time() {
    let corpus = Corpus::new();
    corpus.write("pdf_man/syllabus/ROB/enseignements.pdf", b"%PDF-s");
    corpus.write("pdf_man/MAIN/syllabus_MAIN.pdf", b"%PDF-m");
    corpus.write("pdf_man/MAIN/charte.pdf", b"%PDF-c");

    let items = corpus.detector.prepare().unwrap();
    let kinds: BTreeMap<&str, SourceKind> = items
        .iter()
        .map(|i| (i.relative_name.as_str(), i.kind))
        .collect();

    assert_eq!(kinds["enseignements.pdf"], SourceKind::Syllabus);
    assert_eq!(kinds["syllabus_MAIN.pdf"], SourceKind::Syllabus);
    assert_eq!(kinds["charte.pdf"], SourceKind::ManualPdf);
}

#[test]
fn records_hold_absolute_paths() {
    let corpus = Corpus::new();
    let pdf = corpus.write("data_sites/bde/pdf_scrapes/ROB/plan.pdf", b"%PDF");

    let input = corpus.detector.scan_input().unwrap();
    let record = &input[&MapName::SitePdf("bde".into())]["ROB/plan.pdf"];
    assert_eq!(Path::new(&record.absolute_path), pdf.as_path());
    assert_eq!(record.content_hash.len(), 64);
}

#[test]
fn interrupted_write_leaves_previous_map_readable() {
    let corpus = Corpus::new();
    corpus.write("pdf_man/a.pdf", b"%PDF");
    corpus.run_all_succeed();

    let output_dir = corpus.store().dir(Generation::Output);
    std::fs::write(output_dir.join(".pdf_man_map.json.tmpcrash.tmp"), b"{\"a.pdf\": {").unwrap();

    let output = corpus.store().load(Generation::Output, &MapName::ManualPdf);
    assert_eq!(keys(&output), vec!["a.pdf"]);
    assert_eq!(corpus.run_all_succeed(), 0);
}
