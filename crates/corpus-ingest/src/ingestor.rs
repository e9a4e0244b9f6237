//! Batch entry points: scan, process, credit.

use crate::driver::{flush_pending_map_updates, BatchReport, ConcurrentDriver};
use crate::error::{IngestError, IngestResult};
use crate::extract::TextExtractor;
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::validator::SchemaValidator;
use corpus_config::{Config, CorpusPaths};
use corpus_core::{SourceFileRecord, WorkItem};
use corpus_llm::LanguageModel;
use corpus_maps::{hash_file, ChangeDetector, MapStore, SourceLayout};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Ties the change detector, the pipeline and the driver together.
pub struct Ingestor {
    config: Arc<Config>,
    paths: CorpusPaths,
    detector: ChangeDetector,
    pipeline: Pipeline,
}

impl Ingestor {
    /// Build every component from the configuration.
    ///
    /// A missing or malformed schema file is a deployment error and fails
    /// with [`IngestError::FatalConfig`].
    pub fn from_config(config: Arc<Config>, model: Arc<dyn LanguageModel>) -> IngestResult<Self> {
        config.validate()?;
        let paths = config.corpus_paths()?;
        let validator = SchemaValidator::from_file(&paths.schema_path)?;

        let store = MapStore::new(paths.maps_dir.clone())
            .with_lock_timeout(Duration::from_secs(config.pipeline.lock_timeout_seconds))
            .with_stale_after(Duration::from_secs(config.pipeline.stale_lock_seconds));
        let layout = SourceLayout::new(paths.data_sites_dir.clone(), paths.manual_pdf_dir.clone())
            .with_excluded_sites(&config.corpus.excluded_sites)
            .with_ignore_patterns(&config.corpus.ignore_patterns);
        let detector = ChangeDetector::new(store, layout);
        let pipeline = Pipeline::from_config(&config, &paths, model, Arc::new(validator));

        debug!("Ingestor ready for {:?}", paths.root);
        Ok(Self {
            config,
            paths,
            detector,
            pipeline,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.pipeline = self.pipeline.with_extractor(extractor);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &CorpusPaths {
        &self.paths
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn ensure_dirs(&self) -> IngestResult<()> {
        self.paths.ensure_output_dirs()?;
        self.detector.store().ensure_dirs()?;
        Ok(())
    }

    /// Rebuild the input maps, prune orphans and list what changed.
    pub async fn scan(&self) -> IngestResult<Vec<WorkItem>> {
        self.ensure_dirs()?;
        let detector = self.detector.clone();
        let items = tokio::task::spawn_blocking(move || detector.prepare())
            .await
            .map_err(|e| IngestError::Task(e.to_string()))??;
        info!("{} files to process", items.len());
        Ok(items)
    }

    /// Driver configured for this corpus.
    pub fn driver(&self) -> ConcurrentDriver {
        ConcurrentDriver::from_config(self.pipeline.clone(), &self.config, &self.paths)
    }

    /// Scan, process every changed file, then credit the output maps once.
    pub async fn run(&self) -> IngestResult<BatchReport> {
        self.run_with(self.driver()).await
    }

    /// Like [`Ingestor::run`] with a custom driver, e.g. one reporting
    /// progress.
    pub async fn run_with(&self, driver: ConcurrentDriver) -> IngestResult<BatchReport> {
        let items = self.scan().await?;
        let report = driver.run_batch(items).await;
        flush_pending_map_updates(&self.detector, report.pending.clone()).await?;
        Ok(report)
    }

    /// Run a single file through the pipeline without touching the maps.
    pub async fn process_file(&self, path: &Path) -> IngestResult<PipelineOutcome> {
        if !path.exists() {
            return Err(IngestError::FileNotFound(path.to_path_buf()));
        }
        self.ensure_dirs()?;

        let path = path.canonicalize()?;
        let hash = hash_file(&path)?;
        let (map, relative_name, kind) = self.detector.layout().classify_path(&path);
        let item = WorkItem {
            map,
            relative_name,
            record: SourceFileRecord::new(hash, path.to_string_lossy()),
            kind,
        };

        info!("Processing {:?} as {}", path, kind);
        Ok(self.pipeline.run(&item).await)
    }
}
