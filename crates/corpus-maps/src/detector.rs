//! Change detection across the input, output and to-process generations.

use crate::error::MapResult;
use crate::hash::compute_hash;
use crate::store::MapStore;
use corpus_core::{FileMap, Generation, MapName, SourceFileRecord, SourceKind, WorkItem};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const PDF_SCRAPES: &str = "pdf_scrapes";
const JSON_SCRAPES: &str = "json_scrapes";

/// Where the source collections live on disk.
///
/// Each site directory under `data_sites_dir` may hold `pdf_scrapes/` and
/// `json_scrapes/`; manual uploads live under `manual_pdf_dir`.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    data_sites_dir: PathBuf,
    manual_pdf_dir: PathBuf,
    excluded_sites: Vec<String>,
    ignore_patterns: Vec<glob::Pattern>,
}

impl SourceLayout {
    pub fn new(data_sites_dir: impl Into<PathBuf>, manual_pdf_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_sites_dir: data_sites_dir.into(),
            manual_pdf_dir: manual_pdf_dir.into(),
            excluded_sites: vec!["archives".to_string()],
            ignore_patterns: Vec::new(),
        }
    }

    pub fn with_excluded_sites(mut self, sites: &[String]) -> Self {
        self.excluded_sites = sites.iter().map(|s| s.to_lowercase()).collect();
        self
    }

    /// Glob patterns matched against file names. Invalid patterns are
    /// skipped with a warning.
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Self {
        self.ignore_patterns = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid ignore pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();
        self
    }

    pub fn data_sites_dir(&self) -> &Path {
        &self.data_sites_dir
    }

    pub fn manual_pdf_dir(&self) -> &Path {
        &self.manual_pdf_dir
    }

    fn is_excluded_site(&self, site: &str) -> bool {
        let site = site.to_lowercase();
        self.excluded_sites.iter().any(|s| *s == site)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return true;
        };
        name.starts_with('.') || self.ignore_patterns.iter().any(|p| p.matches(&name))
    }

    /// Site directories to scan, sorted by name.
    pub fn sites(&self) -> Vec<(String, PathBuf)> {
        let entries = match std::fs::read_dir(&self.data_sites_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No site directory {:?}: {}", self.data_sites_dir, e);
                return Vec::new();
            }
        };

        let mut sites: Vec<(String, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
            .filter(|(name, _)| !name.starts_with('.') && !self.is_excluded_site(name))
            .collect();
        sites.sort();
        sites
    }

    /// Every map the current layout calls for.
    pub fn expected_maps(&self) -> BTreeSet<MapName> {
        let mut names = BTreeSet::new();
        for (site, dir) in self.sites() {
            if dir.join(PDF_SCRAPES).is_dir() {
                names.insert(MapName::SitePdf(site.clone()));
            }
            if dir.join(JSON_SCRAPES).is_dir() {
                names.insert(MapName::SiteJson(site));
            }
        }
        names.insert(MapName::ManualPdf);
        names
    }

    /// Directory the entries of `name` are relative to.
    pub fn source_root(&self, name: &MapName) -> PathBuf {
        match name {
            MapName::SitePdf(site) => self.data_sites_dir.join(site).join(PDF_SCRAPES),
            MapName::SiteJson(site) => self.data_sites_dir.join(site).join(JSON_SCRAPES),
            MapName::ManualPdf => self.manual_pdf_dir.clone(),
        }
    }

    /// Map, relative name and kind of a single file.
    ///
    /// Files under a configured source root are named the way a scan would
    /// name them. Anything else falls back to [`SourceKind::infer_from_path`].
    pub fn classify_path(&self, path: &Path) -> (MapName, String, SourceKind) {
        let path = canonical(path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Ok(rel) = path.strip_prefix(canonical(&self.data_sites_dir)) {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if parts.len() >= 3 && !self.is_excluded_site(&parts[0]) {
                let site = parts[0].clone();
                let name = match parts[1].as_str() {
                    PDF_SCRAPES => Some((MapName::SitePdf(site), parts[2..].join("/"))),
                    JSON_SCRAPES => Some((MapName::SiteJson(site), file_name.clone())),
                    _ => None,
                };
                if let Some((map, relative_name)) = name {
                    let kind = SourceKind::classify(&map, Path::new(&relative_name));
                    return (map, relative_name, kind);
                }
            }
        }

        if let Ok(rel) = path.strip_prefix(canonical(&self.manual_pdf_dir)) {
            let kind = SourceKind::classify(&MapName::ManualPdf, rel);
            return (MapName::ManualPdf, file_name, kind);
        }

        let kind = SourceKind::infer_from_path(&path);
        let map = match kind {
            SourceKind::WebPage | SourceKind::ScrapedPdf => {
                let site = site_from_path(&path).unwrap_or_else(|| "unknown".to_string());
                if kind == SourceKind::WebPage {
                    MapName::SiteJson(site)
                } else {
                    MapName::SitePdf(site)
                }
            }
            SourceKind::ManualPdf | SourceKind::Syllabus => MapName::ManualPdf,
        };
        (map, file_name, kind)
    }

    /// Hash every file of one map.
    fn scan_map(&self, name: &MapName) -> FileMap {
        let root = self.source_root(name);
        let mut map = FileMap::new();
        if !root.is_dir() {
            return map;
        }

        let (max_depth, extension) = match name {
            MapName::SiteJson(_) => (1, "json"),
            MapName::SitePdf(_) | MapName::ManualPdf => (usize::MAX, "pdf"),
        };

        let walker = WalkDir::new(&root)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", root, e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || self.is_ignored(path) {
                continue;
            }
            let matches_ext = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }

            let relative_name = match name {
                MapName::SitePdf(_) => path
                    .strip_prefix(&root)
                    .unwrap_or(path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
                MapName::SiteJson(_) | MapName::ManualPdf => {
                    entry.file_name().to_string_lossy().into_owned()
                }
            };

            let Some(hash) = compute_hash(path) else {
                continue;
            };
            let absolute = canonical(path).to_string_lossy().into_owned();
            if let Some(previous) = map.get(&relative_name) {
                warn!(
                    "{} appears twice in {}: {} replaces {}",
                    relative_name, name, absolute, previous.absolute_path
                );
            }
            map.insert(relative_name, SourceFileRecord::new(hash, absolute));
        }
        map
    }
}

/// What [`ChangeDetector::prune_orphans`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Entries dropped from output and to-process maps.
    pub entries: usize,
    /// Map files deleted because their source is no longer configured.
    pub map_files: usize,
}

/// Keeps the three map generations in step with the source directories.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    store: MapStore,
    layout: SourceLayout,
}

impl ChangeDetector {
    pub fn new(store: MapStore, layout: SourceLayout) -> Self {
        Self { store, layout }
    }

    pub fn store(&self) -> &MapStore {
        &self.store
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// Rebuild the input generation from disk.
    ///
    /// Also creates an empty output map for every new source and deletes the
    /// input maps of sources that disappeared.
    pub fn scan_input(&self) -> MapResult<BTreeMap<MapName, FileMap>> {
        self.store.ensure_dirs()?;
        let expected = self.layout.expected_maps();

        let mut maps = BTreeMap::new();
        for name in &expected {
            let map = self.layout.scan_map(name);
            debug!("Scanned {}: {} files", name, map.len());
            self.store.save(Generation::Input, name, &map)?;
            if !self.store.exists(Generation::Output, name) {
                self.store.save(Generation::Output, name, &FileMap::new())?;
            }
            maps.insert(name.clone(), map);
        }

        for name in self.store.list(Generation::Input)? {
            if !expected.contains(&name) {
                info!("Removing input map of unconfigured source {}", name);
                self.store.remove(Generation::Input, &name)?;
            }
        }

        info!(
            "Scanned {} maps, {} files",
            maps.len(),
            maps.values().map(|m| m.len()).sum::<usize>()
        );
        Ok(maps)
    }

    /// Entries of `input` that are new or differ from `output` by hash or path.
    pub fn diff(input: &FileMap, output: &FileMap) -> FileMap {
        input
            .iter()
            .filter(|(name, record)| output.get(*name) != Some(record))
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect()
    }

    /// Next output map: previous entries that still match the input exactly,
    /// plus every processed entry.
    pub fn reconcile(output: &FileMap, input: &FileMap, to_process: &FileMap) -> FileMap {
        let mut result: FileMap = output
            .iter()
            .filter(|(name, record)| input.get(*name) == Some(record))
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        for (name, record) in to_process {
            result.insert(name.clone(), record.clone());
        }
        result
    }

    /// Drop output and to-process entries whose file left the input, and
    /// delete map files of sources no longer configured.
    pub fn prune_orphans(&self, input: &BTreeMap<MapName, FileMap>) -> MapResult<PruneReport> {
        let mut report = PruneReport::default();

        for generation in [Generation::Output, Generation::ToProcess] {
            for name in self.store.list(generation)? {
                let Some(input_map) = input.get(&name) else {
                    info!("Removing stale map {} from {}", name, generation);
                    if self.store.remove(generation, &name)? {
                        report.map_files += 1;
                    }
                    continue;
                };

                let current = self.store.load(generation, &name);
                if current.keys().all(|k| input_map.contains_key(k)) {
                    continue;
                }

                let mut dropped = 0;
                self.store.update(generation, &name, |map| {
                    let before = map.len();
                    map.retain(|k, _| input_map.contains_key(k));
                    dropped = before - map.len();
                })?;
                debug!("Pruned {} entries from {}/{}", dropped, generation, name);
                report.entries += dropped;
            }
        }

        if report.entries > 0 || report.map_files > 0 {
            info!(
                "Pruned {} orphaned entries and {} stale map files",
                report.entries, report.map_files
            );
        }
        Ok(report)
    }

    /// Diff every input map against its output map and persist the result
    /// as the to-process generation.
    pub fn compute_to_process(
        &self,
        input: &BTreeMap<MapName, FileMap>,
    ) -> MapResult<BTreeMap<MapName, FileMap>> {
        let mut result = BTreeMap::new();
        for (name, input_map) in input {
            let output = self.store.load(Generation::Output, name);
            let to_process = Self::diff(input_map, &output);
            self.store.save(Generation::ToProcess, name, &to_process)?;
            if !to_process.is_empty() {
                info!("{}: {} files to process", name, to_process.len());
            }
            result.insert(name.clone(), to_process);
        }
        Ok(result)
    }

    /// Record processed entries in the output generation.
    ///
    /// Each touched output map is rewritten once, under its lock. When every
    /// output map is still empty the entries are copied over as they are.
    pub fn promote(&self, processed: &BTreeMap<MapName, FileMap>) -> MapResult<()> {
        let first_run = self
            .store
            .list(Generation::Output)?
            .iter()
            .all(|name| self.store.load(Generation::Output, name).is_empty());

        for (name, entries) in processed {
            if entries.is_empty() {
                continue;
            }
            let updated = if first_run {
                self.store.update(Generation::Output, name, |output| {
                    output.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
                })?
            } else {
                let input = self.store.load(Generation::Input, name);
                self.store.update(Generation::Output, name, |output| {
                    *output = Self::reconcile(output, &input, entries);
                })?
            };
            info!(
                "Promoted {} entries into {} ({} total)",
                entries.len(),
                name,
                updated.len()
            );
        }
        Ok(())
    }

    /// Turn to-process maps into work items, classifying each file.
    pub fn work_items(&self, to_process: &BTreeMap<MapName, FileMap>) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for (name, map) in to_process {
            let root = canonical(&self.layout.source_root(name));
            for (relative_name, record) in map {
                let path = record.path();
                let relative = path
                    .strip_prefix(&root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| PathBuf::from(relative_name));
                items.push(WorkItem {
                    map: name.clone(),
                    relative_name: relative_name.clone(),
                    record: record.clone(),
                    kind: SourceKind::classify(name, &relative),
                });
            }
        }
        items
    }

    /// Scan, prune and diff: everything needed before a batch.
    pub fn prepare(&self) -> MapResult<Vec<WorkItem>> {
        let input = self.scan_input()?;
        self.prune_orphans(&input)?;
        let to_process = self.compute_to_process(&input)?;
        Ok(self.work_items(&to_process))
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn site_from_path(path: &Path) -> Option<String> {
    let mut components = path.components().map(|c| c.as_os_str().to_string_lossy());
    components.find(|c| c == "data_sites")?;
    components.next().map(|c| c.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str, path: &str) -> SourceFileRecord {
        SourceFileRecord::new(hash, path)
    }

    fn map(entries: &[(&str, &str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(name, hash, path)| (name.to_string(), record(hash, path)))
            .collect()
    }

    #[test]
    fn test_diff_new_and_changed() {
        let input = map(&[
            ("a.pdf", "h1", "/x/a.pdf"),
            ("b.pdf", "h2", "/x/b.pdf"),
            ("c.pdf", "h3", "/x/c.pdf"),
        ]);
        let output = map(&[
            ("a.pdf", "h1", "/x/a.pdf"),
            ("b.pdf", "old", "/x/b.pdf"),
            ("c.pdf", "h3", "/moved/c.pdf"),
        ]);

        let diff = ChangeDetector::diff(&input, &output);
        assert_eq!(diff.keys().collect::<Vec<_>>(), vec!["b.pdf", "c.pdf"]);
    }

    #[test]
    fn test_diff_against_empty_output() {
        let input = map(&[("a.pdf", "h1", "/x/a.pdf")]);
        assert_eq!(ChangeDetector::diff(&input, &FileMap::new()), input);
    }

    #[test]
    fn test_reconcile() {
        let output = map(&[
            ("kept.pdf", "h1", "/x/kept.pdf"),
            ("stale.pdf", "old", "/x/stale.pdf"),
            ("gone.pdf", "h9", "/x/gone.pdf"),
        ]);
        let input = map(&[
            ("kept.pdf", "h1", "/x/kept.pdf"),
            ("stale.pdf", "new", "/x/stale.pdf"),
            ("fresh.pdf", "h4", "/x/fresh.pdf"),
        ]);
        let processed = map(&[("fresh.pdf", "h4", "/x/fresh.pdf")]);

        let result = ChangeDetector::reconcile(&output, &input, &processed);
        assert_eq!(
            result.keys().collect::<Vec<_>>(),
            vec!["fresh.pdf", "kept.pdf"]
        );
    }

    #[test]
    fn test_classify_path_under_roots() {
        let dir = tempfile::tempdir().unwrap();
        let sites = dir.path().join("data_sites");
        let manual = dir.path().join("pdf_man");
        std::fs::create_dir_all(sites.join("bde/pdf_scrapes/ROB")).unwrap();
        std::fs::create_dir_all(sites.join("bde/json_scrapes")).unwrap();
        std::fs::create_dir_all(manual.join("MAIN")).unwrap();
        let layout = SourceLayout::new(&sites, &manual);

        let pdf = sites.join("bde/pdf_scrapes/ROB/plan.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        assert_eq!(
            layout.classify_path(&pdf),
            (
                MapName::SitePdf("bde".into()),
                "ROB/plan.pdf".to_string(),
                SourceKind::ScrapedPdf
            )
        );

        let page = sites.join("bde/json_scrapes/page.json");
        std::fs::write(&page, b"{}").unwrap();
        assert_eq!(layout.classify_path(&page).2, SourceKind::WebPage);

        let syllabus = manual.join("MAIN/syllabus_MAIN.pdf");
        std::fs::write(&syllabus, b"%PDF").unwrap();
        assert_eq!(
            layout.classify_path(&syllabus),
            (
                MapName::ManualPdf,
                "syllabus_MAIN.pdf".to_string(),
                SourceKind::Syllabus
            )
        );
    }

    #[test]
    fn test_ignored_and_hidden_files() {
        let layout = SourceLayout::new("/d", "/m").with_ignore_patterns(&[
            "*.tmp".to_string(),
            "[".to_string(),
        ]);
        assert!(layout.is_ignored(Path::new("/m/a.pdf.tmp")));
        assert!(layout.is_ignored(Path::new("/m/.hidden.pdf")));
        assert!(!layout.is_ignored(Path::new("/m/a.pdf")));
    }
}
