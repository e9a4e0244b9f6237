//! Bounded worker pool running the pipeline over a batch of files.

use crate::error::{IngestError, IngestResult};
use crate::pipeline::{Pipeline, PipelineOutcome};
use corpus_config::{Config, CorpusPaths};
use corpus_core::{
    BatchSummary, Disposition, FileMap, MapName, ProgressReport, ProgressStatus, WorkItem,
};
use corpus_maps::{write_json_atomic, ChangeDetector};
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Called after every completed file.
pub type ProgressCallback = Arc<dyn Fn(&ProgressReport, &PipelineOutcome) + Send + Sync>;

/// Default pool size: one core left for the rest of the system.
pub fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Output-map credit accumulated during a batch, flushed once at the end.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    inner: Mutex<BTreeMap<MapName, FileMap>>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, item: &WorkItem) {
        match self.inner.lock() {
            Ok(mut pending) => {
                pending
                    .entry(item.map.clone())
                    .or_default()
                    .insert(item.relative_name.clone(), item.record.clone());
            }
            Err(e) => error!("Pending map updates lock poisoned: {}", e),
        }
    }

    pub fn take(&self) -> BTreeMap<MapName, FileMap> {
        self.inner
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

/// Everything a batch produced.
#[derive(Debug)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub progress: ProgressReport,
    pub outcomes: Vec<PipelineOutcome>,
    /// Output-map entries to credit, grouped by map.
    pub pending: BTreeMap<MapName, FileMap>,
}

/// Fans the pipeline out over a bounded pool of tasks.
pub struct ConcurrentDriver {
    pipeline: Pipeline,
    max_workers: usize,
    progress_path: Option<PathBuf>,
    credit_rejected: bool,
    on_progress: Option<ProgressCallback>,
}

impl ConcurrentDriver {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            max_workers: default_workers(),
            progress_path: None,
            credit_rejected: false,
            on_progress: None,
        }
    }

    pub fn from_config(pipeline: Pipeline, config: &Config, paths: &CorpusPaths) -> Self {
        let driver = Self::new(pipeline)
            .with_progress_file(&paths.progress_file)
            .with_credit_rejected(config.pipeline.credit_rejected);
        match config.pipeline.max_workers {
            Some(workers) => driver.with_max_workers(workers),
            None => driver,
        }
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    pub fn with_progress_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.progress_path = Some(path.into());
        self
    }

    /// Also credit files that ended rejected, so they are not retried until
    /// they change.
    pub fn with_credit_rejected(mut self, credit: bool) -> Self {
        self.credit_rejected = credit;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Pool size for a batch of `files`.
    pub fn worker_count(&self, files: usize) -> usize {
        self.max_workers.min(files).max(1)
    }

    fn write_progress(&self, progress: &ProgressReport) {
        if let Some(path) = &self.progress_path {
            if let Err(e) = write_json_atomic(path, progress) {
                warn!("Cannot write progress to {:?}: {}", path, e);
            }
        }
    }

    fn credits(&self, disposition: Disposition) -> bool {
        match disposition {
            Disposition::Valid => true,
            Disposition::Rejected => self.credit_rejected,
            Disposition::Errored => false,
        }
    }

    /// Run every item through the pipeline. One file's failure, or panic,
    /// never stops the others.
    pub async fn run_batch(&self, items: Vec<WorkItem>) -> BatchReport {
        let mut progress = ProgressReport::new(items.len());
        let mut summary = BatchSummary::default();
        let pending = PendingUpdates::new();
        let mut outcomes = Vec::with_capacity(items.len());

        if items.is_empty() {
            info!("Nothing to process");
            self.write_progress(&progress);
            return BatchReport {
                summary,
                progress,
                outcomes,
                pending: pending.take(),
            };
        }

        let workers = self.worker_count(items.len());
        info!("Processing {} files with {} workers", items.len(), workers);
        self.write_progress(&progress);

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for item in items {
            let semaphore = semaphore.clone();
            let pipeline = self.pipeline.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                match AssertUnwindSafe(pipeline.run(&item)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!("Pipeline panicked on {:?}: {}", item.path(), message);
                        PipelineOutcome::panicked(&item, &message)
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            progress.current += 1;
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Worker task lost: {}", e);
                    summary.record(Disposition::Errored);
                    self.write_progress(&progress);
                    continue;
                }
            };

            summary.record(outcome.disposition);
            if self.credits(outcome.disposition) {
                pending.record(&outcome.item);
            }
            debug!(
                "[{}/{}] {} -> {}",
                progress.current,
                progress.total,
                outcome.item.relative_name,
                outcome.disposition
            );

            self.write_progress(&progress);
            if let Some(callback) = &self.on_progress {
                callback(&progress, &outcome);
            }
            outcomes.push(outcome);
        }

        progress.status = ProgressStatus::Completed;
        self.write_progress(&progress);
        info!(
            "Batch done: {} processed, {} valid, {} rejected, {} errored",
            summary.processed, summary.valid, summary.rejected, summary.errored
        );

        BatchReport {
            summary,
            progress,
            outcomes,
            pending: pending.take(),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Write the batch's output-map credit, each touched map exactly once.
/// Returns the number of entries credited.
pub async fn flush_pending_map_updates(
    detector: &ChangeDetector,
    pending: BTreeMap<MapName, FileMap>,
) -> IngestResult<usize> {
    let count = pending.values().map(FileMap::len).sum();
    if count == 0 {
        return Ok(0);
    }

    let detector = detector.clone();
    tokio::task::spawn_blocking(move || detector.promote(&pending))
        .await
        .map_err(|e| IngestError::Task(e.to_string()))??;

    info!("Flushed {} output map entries", count);
    Ok(count)
}

/// Read a progress file written by a driver. Missing or malformed files
/// read as `None`.
pub fn read_progress(path: &Path) -> Option<ProgressReport> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_core::SourceFileRecord;

    fn item(map: MapName, name: &str) -> WorkItem {
        WorkItem {
            map,
            relative_name: name.into(),
            record: SourceFileRecord::new(format!("h-{}", name), format!("/x/{}", name)),
            kind: corpus_core::SourceKind::ManualPdf,
        }
    }

    #[test]
    fn test_pending_updates_group_by_map() {
        let pending = PendingUpdates::new();
        pending.record(&item(MapName::ManualPdf, "a.pdf"));
        pending.record(&item(MapName::ManualPdf, "b.pdf"));
        pending.record(&item(MapName::SiteJson("bde".into()), "p.json"));

        let taken = pending.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[&MapName::ManualPdf].len(), 2);
        assert!(pending.take().is_empty());
    }

    #[test]
    fn test_default_workers_at_least_one() {
        assert!(default_workers() >= 1);
    }

    #[test]
    fn test_read_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        assert!(read_progress(&path).is_none());

        write_json_atomic(&path, &ProgressReport::new(4)).unwrap();
        let report = read_progress(&path).unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.status, ProgressStatus::Running);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
