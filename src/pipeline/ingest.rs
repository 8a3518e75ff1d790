//! Per-file ingest orchestration.
//!
//! One [`IngestPipeline`] serves one worker. For every eligible file it:
//! 1. copies the content into a temp file (same extension, bounded chunks)
//! 2. normalizes it with ImageMagick into a temp PNG
//! 3. runs Tesseract on the PNG
//! 4. posts non-empty text as a keyword hit, or reports that nothing was found
//!
//! Temp files live in a per-file scope and are removed before `process`
//! returns, on every path. No failure escapes `process`: each one is logged
//! and the host moves on to the next file.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::eligibility::is_eligible;
use super::ocr::OcrStage;
use super::preprocess::PreprocessStage;
use super::sink::{ExtractionResult, IngestMessage, NotificationSink, ResultSink, Severity};
use super::source::SourceFile;
use super::temp::{TempResource, TempScope};
use super::tool::ToolRunner;
use super::IngestError;
use crate::config::{ToolConfig, APP_NAME};
use crate::settings::{Config, JobSettings};

/// Read size when copying source content to disk.
pub const COPY_CHUNK_SIZE: usize = 8192;

/// Status handed back to the host. Always `Ok`: a single file never stops
/// the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    Ok,
}

/// Per-job input from the host.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub settings: JobSettings,
}

impl JobContext {
    pub fn new(settings: JobSettings) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            settings,
        }
    }
}

/// Lifecycle hooks a file-level ingest module exposes to its host.
pub trait FileIngestModule {
    /// Parse the job configuration. Called once before any file.
    fn start_up(&mut self, context: JobContext);

    fn process(&mut self, file: &dyn SourceFile) -> ProcessResult;

    /// Report the run summary. Called once after the last file.
    fn shut_down(&mut self);
}

/// Pipeline step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Materialize,
    Preprocess,
    Extract,
    Post,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Materialize => "materialize",
            Self::Preprocess => "preprocess",
            Self::Extract => "extract",
            Self::Post => "post",
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FileOutcome {
    Skipped,
    TextFound { chars: usize },
    NoText,
    Failed { stage: Stage, severe: bool },
}

/// Counters for one job, owned by one pipeline instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub processed_with_text: u64,
    pub no_text: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    error: IngestError,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(IngestError) -> Self {
        move |error| Self { stage, error }
    }
}

pub struct IngestPipeline {
    runner: Box<dyn ToolRunner + Send>,
    temps: TempResource,
    preprocess: PreprocessStage,
    ocr: OcrStage,
    results: Arc<dyn ResultSink + Send + Sync>,
    notifier: Arc<dyn NotificationSink + Send + Sync>,
    config: Config,
    job_id: Uuid,
    counters: RunCounters,
}

impl IngestPipeline {
    pub fn new(
        runner: Box<dyn ToolRunner + Send>,
        tools: &ToolConfig,
        results: Arc<dyn ResultSink + Send + Sync>,
        notifier: Arc<dyn NotificationSink + Send + Sync>,
    ) -> Self {
        Self {
            runner,
            temps: TempResource::new(&tools.temp_dir),
            preprocess: PreprocessStage::new(&tools.magick, tools.timeout),
            ocr: OcrStage::new(&tools.tesseract, tools.timeout),
            results,
            notifier,
            config: Config::default(),
            job_id: Uuid::nil(),
            counters: RunCounters::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Run one file through the pipeline and report what happened.
    pub fn process_file(&mut self, file: &dyn SourceFile) -> FileOutcome {
        if !is_eligible(file, &self.config) {
            self.counters.skipped += 1;
            return FileOutcome::Skipped;
        }

        let name = file.name();
        tracing::info!(file = name, id = file.id(), "Processing file");

        let mut temps = self.temps.scope();
        let extracted = self.extract(file, &mut temps);
        temps.release_all();
        drop(temps);

        match extracted {
            Ok(text) if text.is_empty() => self.report_no_text(name),
            Ok(text) => self.report_text(file, text),
            Err(failure) => {
                log_failure(name, &failure);
                self.counters.failed += 1;
                FileOutcome::Failed {
                    stage: failure.stage,
                    severe: failure.error.is_severe(),
                }
            }
        }
    }

    fn extract(
        &self,
        file: &dyn SourceFile,
        temps: &mut TempScope<'_>,
    ) -> Result<String, StageFailure> {
        let source_path = materialize(file, temps).map_err(StageFailure::at(Stage::Materialize))?;
        tracing::info!(
            file = file.name(),
            path = %source_path.display(),
            "Temporary original image file saved"
        );

        let (normalized, outcome) = self
            .preprocess
            .run(self.runner.as_ref(), temps, &source_path, &self.config)
            .map_err(StageFailure::at(Stage::Preprocess))?;
        if !outcome.success() {
            return Err(StageFailure {
                stage: Stage::Preprocess,
                error: IngestError::ToolFailed {
                    tool: PreprocessStage::NAME,
                    exit: outcome.exit(),
                    stderr: outcome.stderr.trim().to_string(),
                },
            });
        }
        tracing::info!(
            file = file.name(),
            path = %normalized.display(),
            "Image preprocessed with ImageMagick"
        );

        let (text, outcome) = self
            .ocr
            .run(self.runner.as_ref(), &normalized, &self.config)
            .map_err(StageFailure::at(Stage::Extract))?;
        if !outcome.success() {
            return Err(StageFailure {
                stage: Stage::Extract,
                error: IngestError::ToolFailed {
                    tool: OcrStage::NAME,
                    exit: outcome.exit(),
                    stderr: outcome.stderr.trim().to_string(),
                },
            });
        }
        tracing::info!(file = file.name(), chars = text.chars().count(), "OCR text extracted");

        Ok(text)
    }

    fn report_text(&mut self, file: &dyn SourceFile, text: String) -> FileOutcome {
        // Counts files that yielded text, even if posting below fails.
        self.counters.processed_with_text += 1;
        let chars = text.chars().count();
        let result = ExtractionResult::keyword_hit(file.id(), file.name(), text, APP_NAME, self.job_id);

        if let Err(e) = self.results.post_result(&result) {
            let failure = StageFailure {
                stage: Stage::Post,
                error: IngestError::ResultPosting(e),
            };
            log_failure(file.name(), &failure);
            return FileOutcome::Failed {
                stage: Stage::Post,
                severe: true,
            };
        }

        self.notifier.post_message(IngestMessage::new(
            Severity::Data,
            APP_NAME,
            format!("OCR text found and saved for {}", file.name()),
        ));
        FileOutcome::TextFound { chars }
    }

    fn report_no_text(&mut self, name: &str) -> FileOutcome {
        self.counters.no_text += 1;
        tracing::info!(file = name, "No text found");
        self.notifier.post_message(IngestMessage::new(
            Severity::Info,
            APP_NAME,
            format!("No text found in {name}"),
        ));
        FileOutcome::NoText
    }
}

impl FileIngestModule for IngestPipeline {
    fn start_up(&mut self, context: JobContext) {
        self.job_id = context.job_id;
        self.config = Config::from_settings(&context.settings);
        self.counters = RunCounters::default();

        if self.config.is_empty() {
            tracing::info!("No image types selected. Module will not run on any files.");
        } else {
            tracing::info!(
                job_id = %self.job_id,
                extensions = ?self.config.accepted_extensions,
                grayscale = self.config.grayscale,
                skip_resize = self.config.skip_resize,
                resize = %self.config.resize_percent,
                language = %self.config.language_code,
                "OCR module started"
            );
        }
    }

    fn process(&mut self, file: &dyn SourceFile) -> ProcessResult {
        self.process_file(file);
        ProcessResult::Ok
    }

    fn shut_down(&mut self) {
        let counters = self.counters;
        tracing::info!(
            job_id = %self.job_id,
            with_text = counters.processed_with_text,
            no_text = counters.no_text,
            failed = counters.failed,
            "OCR module finished"
        );
        self.notifier.post_message(IngestMessage::new(
            Severity::Data,
            APP_NAME,
            format!(
                "OCR module finished. {} images processed.",
                counters.processed_with_text
            ),
        ));
    }
}

/// Copy the file content into a temp file carrying the original extension.
fn materialize(file: &dyn SourceFile, temps: &mut TempScope<'_>) -> Result<PathBuf, IngestError> {
    let path = temps
        .acquire(&original_suffix(file.name()))
        .map_err(IngestError::TempFile)?;

    let mut reader = file.open().map_err(IngestError::SourceRead)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .map_err(IngestError::TempFile)?;

    let mut buffer = [0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IngestError::SourceRead(e)),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(IngestError::TempFile)?;
        copied += n as u64;
    }
    writer.flush().map_err(IngestError::TempFile)?;

    tracing::debug!(path = %path.display(), bytes = copied, "Source content copied");
    Ok(path)
}

/// `.ext` of the original name, case preserved; empty when there is none.
fn original_suffix(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => String::new(),
    }
}

fn log_failure(name: &str, failure: &StageFailure) {
    if failure.error.is_severe() {
        tracing::error!(
            file = name,
            stage = failure.stage.as_str(),
            error = %failure.error,
            "File left unprocessed"
        );
    } else {
        tracing::warn!(
            file = name,
            stage = failure.stage.as_str(),
            error = %failure.error,
            "File left unprocessed"
        );
    }
}
