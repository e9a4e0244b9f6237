//! Per-file processing state machine.
//!
//! ```text
//! check_type_of_input
//!   -> syllabus_extract          [syllabus]        -> validate
//!   -> normalize_json_file       [web page]        -> fill_tags
//!   -> load_pdf_to_data_scraped  [scraped pdf]     -> fill_metadata_scraped -> fill_tags
//!   -> load_pdf_to_data_manual   [anything else]   -> fill_metadata_manual  -> fill_tags
//! fill_tags -> validate -> save | save_to_error -> end
//! ```
//!
//! With [`RoutingMode::Classified`] the metadata stages lead to
//! `detect_type` and `fill_tags` leads to `fill_type_specific`.
//!
//! A stage that fails records the error on the state and hands it to
//! `save_to_error`; nothing escapes [`Pipeline::run`].

use crate::classifier::TypeClassifier;
use crate::error::{IngestError, IngestResult};
use crate::extract::{load_manual_pdf, load_scraped_pdf, ExtractedPdf, PdfTextExtractor, TextExtractor};
use crate::filler::FieldFiller;
use crate::normalizer::{
    normalize_manual_pdf, normalize_scraped_pdf, normalize_web_entry, read_web_record,
    site_name_for, METADATA_FIELDS,
};
use crate::prompts::{PromptLibrary, METADATA_PROMPT, TAGS_PROMPT};
use crate::syllabus::{chunk_syllabus, extract_syllabus_structure};
use crate::validator::{validate_syllabus, SchemaValidator};
use corpus_config::{Config, CorpusPaths, RoutingMode};
use corpus_core::{CanonicalDocument, Disposition, SourceKind, SyllabusStructure, WorkItem};
use corpus_llm::LanguageModel;
use corpus_maps::write_json_atomic;
use serde::Serialize;
use serde_json::Value;
use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One node of the processing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CheckTypeOfInput,
    NormalizeJsonFile,
    LoadPdfToDataScraped,
    LoadPdfToDataManual,
    SyllabusExtract,
    FillMetadataScraped,
    FillMetadataManual,
    DetectType,
    FillTags,
    FillTypeSpecific,
    Validate,
    Save,
    SaveToError,
    End,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CheckTypeOfInput => "check_type_of_input",
            Stage::NormalizeJsonFile => "normalize_json_file",
            Stage::LoadPdfToDataScraped => "load_pdf_to_data_scraped",
            Stage::LoadPdfToDataManual => "load_pdf_to_data_manual",
            Stage::SyllabusExtract => "syllabus_extract",
            Stage::FillMetadataScraped => "fill_metadata_scraped",
            Stage::FillMetadataManual => "fill_metadata_manual",
            Stage::DetectType => "detect_type",
            Stage::FillTags => "fill_tags",
            Stage::FillTypeSpecific => "fill_type_specific",
            Stage::Validate => "validate",
            Stage::Save => "save",
            Stage::SaveToError => "save_to_error",
            Stage::End => "end",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a file turns into: a canonical document, or a syllabus structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineOutput {
    Document(CanonicalDocument),
    Syllabus(SyllabusStructure),
}

/// Everything known about one file while it moves through the stages.
/// Owned by a single run, never shared between workers.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub file_path: PathBuf,
    /// Map the file was listed in; qualifies output names that clash.
    pub source_map: String,
    pub kind: SourceKind,
    pub hash: String,
    pub web_page: bool,
    pub pdf_scraped: bool,
    pub is_syllabus: bool,
    /// Raw loaded content, as handed to the model.
    pub data: Value,
    pub output_data: Option<PipelineOutput>,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub error: Option<String>,
    pub traceback: Vec<String>,
    pub stages: Vec<Stage>,
    pub out_path: Option<PathBuf>,
    #[serde(skip)]
    extracted: Option<ExtractedPdf>,
}

impl PipelineState {
    pub fn new(item: &WorkItem) -> Self {
        Self {
            file_path: item.path(),
            source_map: item.map.file_stem(),
            kind: item.kind,
            hash: item.record.content_hash.clone(),
            web_page: false,
            pdf_scraped: false,
            is_syllabus: false,
            data: Value::Null,
            output_data: None,
            is_valid: false,
            validation_errors: Vec::new(),
            error: None,
            traceback: Vec::new(),
            stages: Vec::new(),
            out_path: None,
            extracted: None,
        }
    }

    /// The document under construction.
    pub fn document(&self) -> Option<&CanonicalDocument> {
        match &self.output_data {
            Some(PipelineOutput::Document(doc)) => Some(doc),
            _ => None,
        }
    }

    fn document_mut(&mut self) -> IngestResult<&mut CanonicalDocument> {
        match &mut self.output_data {
            Some(PipelineOutput::Document(doc)) => Ok(doc),
            _ => Err(IngestError::Task("no document to fill".to_string())),
        }
    }

    fn record_error(&mut self, stage: Stage, err: &IngestError) {
        self.error = Some(format!("{} error: {}", stage, err));

        let mut trace = vec![format!("{}: {}", stage, err)];
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            trace.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        trace.push(format!(
            "stages: {}",
            self.stages
                .iter()
                .map(Stage::as_str)
                .collect::<Vec<_>>()
                .join(" -> ")
        ));
        self.traceback = trace;
    }

    /// Terminal classification of this run.
    pub fn disposition(&self) -> Disposition {
        if self.error.is_some() {
            Disposition::Errored
        } else if self.is_valid && self.out_path.is_some() {
            Disposition::Valid
        } else {
            Disposition::Rejected
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub item: WorkItem,
    pub state: PipelineState,
    pub disposition: Disposition,
}

impl PipelineOutcome {
    /// Outcome of a run that panicked before reaching a terminal state.
    pub(crate) fn panicked(item: &WorkItem, message: &str) -> Self {
        let mut state = PipelineState::new(item);
        state.error = Some(format!("worker panicked: {}", message));
        state.traceback = vec![message.to_string()];
        Self {
            item: item.clone(),
            state,
            disposition: Disposition::Errored,
        }
    }
}

/// Output locations and routing choices of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub valid_dir: PathBuf,
    pub rejected_dir: PathBuf,
    pub syllabus_dir: PathBuf,
    pub manual_pdf_dir: PathBuf,
    pub routing: RoutingMode,
    pub emit_syllabus_chunks: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config, paths: &CorpusPaths) -> Self {
        Self {
            valid_dir: paths.valid_dir.clone(),
            rejected_dir: paths.rejected_dir.clone(),
            syllabus_dir: paths.syllabus_dir.clone(),
            manual_pdf_dir: paths.manual_pdf_dir.clone(),
            routing: config.pipeline.routing,
            emit_syllabus_chunks: config.pipeline.emit_syllabus_chunks,
        }
    }
}

/// Runs files through the stages. Cheap to clone; every run gets its own
/// [`PipelineState`].
#[derive(Clone)]
pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    filler: FieldFiller,
    classifier: TypeClassifier,
    validator: Arc<SchemaValidator>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        prompts: Arc<PromptLibrary>,
        validator: Arc<SchemaValidator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            extractor: Arc::new(PdfTextExtractor::new()),
            filler: FieldFiller::new(model.clone(), prompts.clone()),
            classifier: TypeClassifier::new(model, prompts),
            validator,
            options,
        }
    }

    /// Pipeline wired from the configuration.
    pub fn from_config(
        config: &Config,
        paths: &CorpusPaths,
        model: Arc<dyn LanguageModel>,
        validator: Arc<SchemaValidator>,
    ) -> Self {
        let prompts = Arc::new(PromptLibrary::new(&paths.prompts_dir));
        Self::new(
            model,
            prompts,
            validator,
            PipelineOptions::from_config(config, paths),
        )
        .with_limits(
            config.pipeline.max_prompt_chars,
            config.pipeline.classify_prefix_chars,
        )
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Prompt size cap for field filling and content prefix for
    /// classification.
    pub fn with_limits(mut self, max_prompt_chars: usize, classify_prefix_chars: usize) -> Self {
        self.filler = self.filler.with_max_chars(max_prompt_chars);
        self.classifier = self.classifier.with_prefix_chars(classify_prefix_chars);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Process one file to a terminal state.
    pub async fn run(&self, item: &WorkItem) -> PipelineOutcome {
        let mut state = PipelineState::new(item);
        let mut stage = Stage::CheckTypeOfInput;

        loop {
            state.stages.push(stage);
            if stage == Stage::End {
                break;
            }

            debug!("[{}] {:?}", stage, state.file_path);
            stage = match self.step(stage, &mut state).await {
                Ok(next) => next,
                Err(e) if stage == Stage::SaveToError => {
                    error!("[{}] {:?}: {}", stage, state.file_path, e);
                    state.record_error(stage, &e);
                    Stage::End
                }
                Err(e) => {
                    warn!("[{}] {:?}: {}", stage, state.file_path, e);
                    state.record_error(stage, &e);
                    Stage::SaveToError
                }
            };
        }

        let disposition = state.disposition();
        info!("{:?}: {}", state.file_path, disposition);
        PipelineOutcome {
            item: item.clone(),
            state,
            disposition,
        }
    }

    async fn step(&self, stage: Stage, state: &mut PipelineState) -> IngestResult<Stage> {
        match stage {
            Stage::CheckTypeOfInput => Ok(self.check_type_of_input(state)),
            Stage::NormalizeJsonFile => {
                self.normalize_json_file(state)?;
                Ok(self.after_metadata())
            }
            Stage::LoadPdfToDataScraped => {
                self.load_pdf(state, true).await?;
                Ok(Stage::FillMetadataScraped)
            }
            Stage::LoadPdfToDataManual => {
                self.load_pdf(state, false).await?;
                Ok(Stage::FillMetadataManual)
            }
            Stage::SyllabusExtract => {
                self.syllabus_extract(state).await?;
                Ok(Stage::Validate)
            }
            Stage::FillMetadataScraped => {
                let pdf = extracted(state)?;
                state.output_data = Some(PipelineOutput::Document(normalize_scraped_pdf(pdf)));
                Ok(self.after_metadata())
            }
            Stage::FillMetadataManual => {
                let mut doc = normalize_manual_pdf(extracted(state)?);
                doc.metadata = self
                    .filler
                    .fill_fields(&state.data, &METADATA_FIELDS, METADATA_PROMPT)
                    .await?;
                state.output_data = Some(PipelineOutput::Document(doc));
                Ok(self.after_metadata())
            }
            Stage::DetectType => {
                let content = state.document_mut()?.content.clone();
                let doc_type = self.classifier.classify(&content).await?;
                state.document_mut()?.document_type = doc_type;
                Ok(Stage::FillTags)
            }
            Stage::FillTags => {
                let filled = self
                    .filler
                    .fill_fields(&state.data, &["tags"], TAGS_PROMPT)
                    .await?;
                state.document_mut()?.tags = tags_from(filled.get("tags"));
                Ok(match self.options.routing {
                    RoutingMode::Graph => Stage::Validate,
                    RoutingMode::Classified => Stage::FillTypeSpecific,
                })
            }
            Stage::FillTypeSpecific => {
                let doc_type = state.document_mut()?.document_type;
                if let Some((fields, template)) = doc_type.type_specific_fields() {
                    let values = self.filler.fill_fields(&state.data, fields, template).await?;
                    state
                        .document_mut()?
                        .type_specific
                        .insert(doc_type.as_str().to_string(), Value::Object(values));
                }
                Ok(Stage::Validate)
            }
            Stage::Validate => {
                self.validate(state)?;
                Ok(if state.is_valid {
                    Stage::Save
                } else {
                    Stage::SaveToError
                })
            }
            Stage::Save => {
                self.save(state)?;
                Ok(Stage::End)
            }
            Stage::SaveToError => {
                self.save_to_error(state)?;
                Ok(Stage::End)
            }
            Stage::End => Ok(Stage::End),
        }
    }

    fn after_metadata(&self) -> Stage {
        match self.options.routing {
            RoutingMode::Graph => Stage::FillTags,
            RoutingMode::Classified => Stage::DetectType,
        }
    }

    fn check_type_of_input(&self, state: &mut PipelineState) -> Stage {
        state.web_page = state.kind.is_web_page();
        state.pdf_scraped = state.kind.is_pdf_scraped();
        state.is_syllabus = state.kind.is_syllabus();

        if state.is_syllabus {
            Stage::SyllabusExtract
        } else if state.web_page && !state.pdf_scraped {
            Stage::NormalizeJsonFile
        } else if state.pdf_scraped {
            Stage::LoadPdfToDataScraped
        } else {
            Stage::LoadPdfToDataManual
        }
    }

    fn normalize_json_file(&self, state: &mut PipelineState) -> IngestResult<()> {
        let path = state.file_path.clone();
        let record =
            read_web_record(&path)?.ok_or_else(|| IngestError::EmptyContent(path.clone()))?;
        let doc = normalize_web_entry(&record, &path.to_string_lossy(), &site_name_for(&path))
            .ok_or_else(|| IngestError::EmptyContent(path.clone()))?;

        state.data = record;
        state.output_data = Some(PipelineOutput::Document(doc));
        Ok(())
    }

    async fn load_pdf(&self, state: &mut PipelineState, scraped: bool) -> IngestResult<()> {
        let extractor = self.extractor.clone();
        let path = state.file_path.clone();
        let manual_root = self.options.manual_pdf_dir.clone();

        let loaded = tokio::task::spawn_blocking(move || {
            if scraped {
                load_scraped_pdf(extractor.as_ref(), &path)
            } else {
                load_manual_pdf(extractor.as_ref(), &path, &manual_root)
            }
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))??;

        let pdf = loaded.ok_or_else(|| IngestError::EmptyContent(state.file_path.clone()))?;
        state.data = serde_json::to_value(&pdf)?;
        state.extracted = Some(pdf);
        Ok(())
    }

    async fn syllabus_extract(&self, state: &mut PipelineState) -> IngestResult<()> {
        let extractor = self.extractor.clone();
        let path = state.file_path.clone();

        let structure =
            tokio::task::spawn_blocking(move || extract_syllabus_structure(extractor.as_ref(), &path))
                .await
                .map_err(|e| IngestError::Task(e.to_string()))??;

        state.data = serde_json::to_value(&structure)?;
        state.output_data = Some(PipelineOutput::Syllabus(structure));
        Ok(())
    }

    fn validate(&self, state: &mut PipelineState) -> IngestResult<()> {
        let violations = match &state.output_data {
            Some(PipelineOutput::Document(doc)) => self.validator.validate(doc)?,
            Some(PipelineOutput::Syllabus(structure)) => validate_syllabus(structure),
            None => return Err(IngestError::Task("nothing to validate".to_string())),
        };

        if !violations.is_empty() {
            info!(
                "{:?} failed validation: {}",
                state.file_path,
                violations.join("; ")
            );
        }
        state.is_valid = violations.is_empty();
        state.validation_errors = violations;
        Ok(())
    }

    fn save(&self, state: &mut PipelineState) -> IngestResult<()> {
        let stem = file_stem(&state.file_path);
        let name = output_name(&state.file_path);
        let out_path = match &state.output_data {
            Some(PipelineOutput::Document(doc)) => {
                let out_path = claim(&self.options.valid_dir, &name, state)?;
                write_json_atomic(&out_path, doc)?;
                out_path
            }
            Some(PipelineOutput::Syllabus(structure)) => {
                let out_path =
                    claim(&self.options.syllabus_dir, &format!("{}.json", stem), state)?;
                write_json_atomic(&out_path, structure)?;
                if self.options.emit_syllabus_chunks {
                    self.save_syllabus_chunks(&file_stem(&out_path), structure, state)?;
                }
                out_path
            }
            None => return Err(IngestError::Task("nothing to save".to_string())),
        };

        release(&self.options.rejected_dir, &name, state)?;
        release(
            &self.options.rejected_dir,
            &format!("{}.error.json", stem),
            state,
        )?;

        info!("[{}] {:?}", Stage::Save, out_path);
        state.out_path = Some(out_path);
        Ok(())
    }

    fn save_syllabus_chunks(
        &self,
        stem: &str,
        structure: &SyllabusStructure,
        state: &PipelineState,
    ) -> IngestResult<()> {
        self.remove_syllabus_chunks(stem, state)?;
        let chunks = chunk_syllabus(structure);
        for (i, chunk) in chunks.iter().enumerate() {
            let path = self
                .options
                .valid_dir
                .join(format!("{}.chunk-{:03}.json", stem, i));
            write_json_atomic(&path, chunk)?;
        }
        debug!("Wrote {} syllabus chunks for {}", chunks.len(), stem);
        Ok(())
    }

    fn remove_syllabus_chunks(&self, stem: &str, state: &PipelineState) -> IngestResult<()> {
        let pattern = format!(
            "{}/{}.chunk-*.json",
            glob::Pattern::escape(&self.options.valid_dir.to_string_lossy()),
            glob::Pattern::escape(stem)
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| IngestError::Task(format!("bad chunk pattern {}: {}", pattern, e)))?;
        for entry in entries.flatten() {
            remove_owned(&entry, state)?;
        }
        Ok(())
    }

    fn save_to_error(&self, state: &mut PipelineState) -> IngestResult<()> {
        let stem = file_stem(&state.file_path);
        let name = output_name(&state.file_path);

        // A file that was valid before must not stay in front of the vectorizer.
        release(&self.options.valid_dir, &name, state)?;
        if state.is_syllabus {
            let structure_name = format!("{}.json", stem);
            release(&self.options.syllabus_dir, &structure_name, state)?;
            for path in placements(&self.options.syllabus_dir, &structure_name, state) {
                self.remove_syllabus_chunks(&file_stem(&path), state)?;
            }
        }

        if let Some(output) = &state.output_data {
            let rejected = claim(&self.options.rejected_dir, &name, state)?;
            write_json_atomic(&rejected, output)?;
        }

        let error_path = claim(
            &self.options.rejected_dir,
            &format!("{}.error.json", stem),
            state,
        )?;
        state.out_path = Some(error_path.clone());
        write_json_atomic(&error_path, &*state)?;

        info!("[{}] {:?}", Stage::SaveToError, error_path);
        Ok(())
    }
}

fn extracted(state: &PipelineState) -> IngestResult<&ExtractedPdf> {
    state
        .extracted
        .as_ref()
        .ok_or_else(|| IngestError::Task("PDF was not loaded".to_string()))
}

fn tags_from(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|t| t.as_str().map(str::trim))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Output file name: the input name, with `.json` in place of `.pdf`.
pub fn output_name(path: &Path) -> String {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if is_pdf {
        format!("{}.json", file_stem(path))
    } else {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Source file an earlier output was written for, as recorded inside it:
/// `source.chemin_local` for documents, `syllabus` for syllabus structures,
/// `file_path` for error reports.
fn recorded_source(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    ["/source/chemin_local", "/syllabus", "/file_path"]
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .map(str::to_string)
}

fn owned_by(path: &Path, state: &PipelineState) -> bool {
    recorded_source(path).as_deref() == Some(state.file_path.to_string_lossy().as_ref())
}

/// Where `name` may live in `dir` for this input: the plain name, or the
/// name qualified by the source map when another input holds the plain one.
fn placements(dir: &Path, name: &str, state: &PipelineState) -> [PathBuf; 2] {
    [
        dir.join(name),
        dir.join(format!("{}__{}", state.source_map, name)),
    ]
}

/// Path this input writes `name` to. Outputs of other inputs are never
/// overwritten.
fn claim(dir: &Path, name: &str, state: &PipelineState) -> IngestResult<PathBuf> {
    let [plain, qualified] = placements(dir, name, state);
    if plain.exists() && !owned_by(&plain, state) {
        warn!(
            "{:?} belongs to another source, writing {:?} instead",
            plain, qualified
        );
        return Ok(qualified);
    }
    remove_owned(&qualified, state)?;
    Ok(plain)
}

/// Drop whatever this input previously wrote as `name` in `dir`.
fn release(dir: &Path, name: &str, state: &PipelineState) -> IngestResult<()> {
    for path in placements(dir, name, state) {
        remove_owned(&path, state)?;
    }
    Ok(())
}

fn remove_owned(path: &Path, state: &PipelineState) -> IngestResult<()> {
    if owned_by(path, state) {
        remove_if_exists(path)
    } else {
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> IngestResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale output {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name() {
        assert_eq!(output_name(Path::new("/x/a.PDF")), "a.json");
        assert_eq!(output_name(Path::new("/x/page.json")), "page.json");
    }

    #[test]
    fn test_tags_from() {
        assert_eq!(
            tags_from(Some(&serde_json::json!(["a", " b ", 3, ""]))),
            vec!["a", "b"]
        );
        assert_eq!(tags_from(Some(&serde_json::json!("x, y"))), vec!["x", "y"]);
        assert!(tags_from(None).is_empty());
    }

    fn pipeline(dir: &Path) -> Pipeline {
        Pipeline::new(
            Arc::new(corpus_llm::ScriptedModel::new()),
            Arc::new(PromptLibrary::builtin()),
            Arc::new(SchemaValidator::builtin().unwrap()),
            PipelineOptions {
                valid_dir: dir.join("valid"),
                rejected_dir: dir.join("rejected"),
                syllabus_dir: dir.join("syllabus"),
                manual_pdf_dir: dir.join("pdf_man"),
                routing: RoutingMode::Graph,
                emit_syllabus_chunks: false,
            },
        )
    }

    fn syllabus_state(specialite: &str) -> PipelineState {
        let item = WorkItem {
            map: corpus_core::MapName::ManualPdf,
            relative_name: "syllabus.pdf".into(),
            record: corpus_core::SourceFileRecord::new("h", "/x/syllabus/syllabus.pdf"),
            kind: SourceKind::Syllabus,
        };
        let mut state = PipelineState::new(&item);
        state.is_syllabus = true;
        state.output_data = Some(PipelineOutput::Syllabus(SyllabusStructure {
            syllabus: "/x/syllabus/syllabus.pdf".into(),
            specialite: specialite.into(),
            toc: Vec::new(),
            courses: Vec::new(),
        }));
        state
    }

    #[tokio::test]
    async fn test_syllabus_without_specialty_goes_to_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let mut state = syllabus_state("");
        let next = pipeline.step(Stage::Validate, &mut state).await.unwrap();
        assert_eq!(next, Stage::SaveToError);
        assert!(!state.is_valid);
        assert_eq!(state.validation_errors.len(), 1);

        let mut state = syllabus_state("ROB");
        let next = pipeline.step(Stage::Validate, &mut state).await.unwrap();
        assert_eq!(next, Stage::Save);
        assert!(state.is_valid);
    }

    #[tokio::test]
    async fn test_check_type_routes_syllabus_first() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let mut state = syllabus_state("ROB");
        let next = pipeline.step(Stage::CheckTypeOfInput, &mut state).await.unwrap();
        assert_eq!(next, Stage::SyllabusExtract);

        state.kind = SourceKind::ScrapedPdf;
        let next = pipeline.step(Stage::CheckTypeOfInput, &mut state).await.unwrap();
        assert_eq!(next, Stage::LoadPdfToDataScraped);
        assert!(state.web_page && state.pdf_scraped);

        state.kind = SourceKind::WebPage;
        let next = pipeline.step(Stage::CheckTypeOfInput, &mut state).await.unwrap();
        assert_eq!(next, Stage::NormalizeJsonFile);
    }

    #[tokio::test]
    async fn test_rejected_syllabus_is_written_with_its_state() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let mut state = syllabus_state("");
        pipeline.step(Stage::Validate, &mut state).await.unwrap();
        pipeline.step(Stage::SaveToError, &mut state).await.unwrap();

        assert_eq!(state.disposition(), Disposition::Rejected);
        assert!(dir.path().join("rejected/syllabus.json").exists());
        assert!(dir.path().join("rejected/syllabus.error.json").exists());
    }

    fn page_state(path: &str, map: corpus_core::MapName) -> PipelineState {
        let item = WorkItem {
            map,
            relative_name: output_name(Path::new(path)),
            record: corpus_core::SourceFileRecord::new("h", path),
            kind: SourceKind::WebPage,
        };
        let mut state = PipelineState::new(&item);
        state.output_data = Some(PipelineOutput::Document(
            CanonicalDocument::new(corpus_core::DocumentType::PageWeb, "texte").with_source(
                corpus_core::SourceInfo {
                    chemin_local: path.into(),
                    ..Default::default()
                },
            ),
        ));
        state
    }

    #[tokio::test]
    async fn test_namesake_outputs_never_replace_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let page_path = "/c/data_sites/bde/json_scrapes/guide.json";
        let valid = dir.path().join("valid/guide.json");
        let qualified = dir.path().join("valid/pdf_man_map__guide.json");

        let mut page = page_state(page_path, corpus_core::MapName::SiteJson("bde".into()));
        pipeline.step(Stage::Save, &mut page).await.unwrap();
        assert!(valid.exists());

        let mut pdf = page_state("/c/pdf_man/DSI/guide.pdf", corpus_core::MapName::ManualPdf);
        pipeline.step(Stage::SaveToError, &mut pdf).await.unwrap();
        assert!(valid.exists());
        assert!(dir.path().join("rejected/guide.json").exists());
        assert!(dir.path().join("rejected/guide.error.json").exists());

        // Once valid, the PDF lands next to the page instead of over it.
        pipeline.step(Stage::Save, &mut pdf).await.unwrap();
        assert_eq!(pdf.out_path.as_deref(), Some(qualified.as_path()));
        let kept: Value = serde_json::from_slice(&std::fs::read(&valid).unwrap()).unwrap();
        assert_eq!(kept["source"]["chemin_local"], page_path);
        assert!(!dir.path().join("rejected/guide.json").exists());
        assert!(!dir.path().join("rejected/guide.error.json").exists());

        // Rejecting it again only takes back its own output.
        pipeline.step(Stage::SaveToError, &mut pdf).await.unwrap();
        assert!(valid.exists());
        assert!(!qualified.exists());
    }

    #[test]
    fn test_error_state_keeps_chain() {
        let item = WorkItem {
            map: corpus_core::MapName::ManualPdf,
            relative_name: "a.pdf".into(),
            record: corpus_core::SourceFileRecord::new("h", "/x/a.pdf"),
            kind: SourceKind::ManualPdf,
        };
        let mut state = PipelineState::new(&item);
        state.stages.push(Stage::CheckTypeOfInput);
        state.stages.push(Stage::LoadPdfToDataManual);
        let err = IngestError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        state.record_error(Stage::LoadPdfToDataManual, &err);

        assert_eq!(state.disposition(), Disposition::Errored);
        assert!(state.error.as_deref().unwrap().starts_with("load_pdf_to_data_manual error"));
        assert!(state.traceback.last().unwrap().contains("check_type_of_input -> load_pdf"));
    }
}
