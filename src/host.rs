//! Directory-scanning host.
//!
//! Plays the role of the ingestion framework: enumerates a directory tree,
//! spreads the entries over worker threads and drives one pipeline per
//! worker through `start_up`, `process` and `shut_down`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ToolConfig;
use crate::pipeline::{
    FileIngestModule, FileOutcome, JobContext, LocalFile, NotificationSink, OcrModuleFactory,
    ResultSink, SinkError, ToolError,
};
use crate::settings::{JobSettings, SettingsError};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Result store error: {0}")]
    Sink(#[from] SinkError),
}

pub struct ScanOptions {
    pub workers: usize,
    pub tools: ToolConfig,
    pub results: Arc<dyn ResultSink + Send + Sync>,
    pub notifier: Arc<dyn NotificationSink + Send + Sync>,
}

impl ScanOptions {
    pub fn new(
        results: Arc<dyn ResultSink + Send + Sync>,
        notifier: Arc<dyn NotificationSink + Send + Sync>,
    ) -> Self {
        Self {
            workers: default_workers(),
            tools: ToolConfig::default(),
            results,
            notifier,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }
}

/// Parallelism capped at 4: each worker may hold two tool processes.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(1)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub job_id: Uuid,
    pub files_seen: usize,
    pub files_with_text: usize,
    pub files_without_text: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
}

impl ScanSummary {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Skipped => self.files_skipped += 1,
            FileOutcome::TextFound { .. } => self.files_with_text += 1,
            FileOutcome::NoText => self.files_without_text += 1,
            FileOutcome::Failed { .. } => self.files_failed += 1,
        }
    }

    fn merge(&mut self, other: &ScanSummary) {
        self.files_with_text += other.files_with_text;
        self.files_without_text += other.files_without_text;
        self.files_failed += other.files_failed;
        self.files_skipped += other.files_skipped;
    }
}

/// Entries of one directory with their "is a directory" flag.
type DirListing = std::io::Result<Vec<(PathBuf, bool)>>;

/// Every entry under `root`, sorted by path. Directories and symlinks are
/// listed too (as non-regular files); symlinks are not followed.
///
/// Only an unreadable `root` fails. Unreadable subdirectories and entries
/// are logged and skipped so the rest of the tree is still scanned.
pub fn collect_files(root: &Path) -> Result<Vec<LocalFile>, HostError> {
    collect_files_with(root, &list_dir)
}

fn collect_files_with(
    root: &Path,
    list: &dyn Fn(&Path) -> DirListing,
) -> Result<Vec<LocalFile>, HostError> {
    let mut paths = walk(root, list)?;
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for (id, path) in paths.into_iter().enumerate() {
        match LocalFile::new(id as u64 + 1, &path) {
            Ok(file) => files.push(file),
            // Removed between listing and stat.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Entry vanished during scan");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
            }
        }
    }
    Ok(files)
}

fn list_dir(dir: &Path) -> DirListing {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        match entry.file_type() {
            Ok(file_type) => entries.push((path, file_type.is_dir())),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
            }
        }
    }
    Ok(entries)
}

fn walk(root: &Path, list: &dyn Fn(&Path) -> DirListing) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match list(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(e),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        for (path, is_dir) in entries {
            if is_dir {
                pending.push(path.clone());
            }
            out.push(path);
        }
    }
    Ok(out)
}

/// Run one ingest job over the tree under `root`.
///
/// Each worker gets its own pipeline and pulls the next unclaimed entry
/// until none remain. Per-file failures are contained by the pipeline; only
/// enumeration and worker setup can fail the job.
pub fn scan_directory(
    root: &Path,
    settings: &JobSettings,
    options: &ScanOptions,
) -> Result<ScanSummary, HostError> {
    let files = collect_files(root)?;
    let factory = OcrModuleFactory::new(
        options.tools.clone(),
        options.results.clone(),
        options.notifier.clone(),
    );

    let workers = options.workers.clamp(1, files.len().max(1));
    let modules = (0..workers)
        .map(|_| factory.create_module())
        .collect::<Result<Vec<_>, _>>()?;

    let job_id = Uuid::new_v4();
    tracing::info!(
        job_id = %job_id,
        root = %root.display(),
        entries = files.len(),
        workers,
        "Scan started"
    );

    let next = AtomicUsize::new(0);
    let partials: Vec<ScanSummary> = std::thread::scope(|s| {
        let handles: Vec<_> = modules
            .into_iter()
            .map(|mut module| {
                let files = &files;
                let next = &next;
                let context = JobContext {
                    job_id,
                    settings: settings.clone(),
                };
                s.spawn(move || {
                    let mut partial = ScanSummary::default();
                    module.start_up(context);
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(file) = files.get(index) else {
                            break;
                        };
                        partial.record(module.process_file(file));
                    }
                    module.shut_down();
                    partial
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(partial) => partial,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut summary = ScanSummary {
        job_id,
        files_seen: files.len(),
        ..ScanSummary::default()
    };
    for partial in &partials {
        summary.merge(partial);
    }

    tracing::info!(
        job_id = %job_id,
        seen = summary.files_seen,
        with_text = summary.files_with_text,
        failed = summary.files_failed,
        "Scan finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MemoryNotifier, MemoryResultSink, Severity, SourceFile};
    use crate::settings::ImageType;
    use tracing_test::traced_test;

    fn touch(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn collect_lists_nested_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.png"), b"x");
        touch(&dir.path().join("a").join("c.jpg"), b"x");

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["a", "c.jpg", "b.png"]);
        assert!(!files[0].is_regular_file());
        assert!(files[1].is_regular_file());

        let mut ids: Vec<u64> = files.iter().map(|f| f.id()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    #[traced_test]
    fn unreadable_subdirectories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.png"), b"x");
        touch(&dir.path().join("locked").join("hidden.png"), b"x");
        touch(&dir.path().join("gone").join("lost.png"), b"x");
        touch(&dir.path().join("open").join("b.png"), b"x");

        let locked = dir.path().join("locked");
        let gone = dir.path().join("gone");
        let list = |path: &Path| -> DirListing {
            if path == locked {
                Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"))
            } else if path == gone {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "removed mid-walk"))
            } else {
                list_dir(path)
            }
        };

        let files = collect_files_with(dir.path(), &list).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["a.png", "gone", "locked", "open", "b.png"]);
        assert!(logs_contain("access denied"));
        assert!(logs_contain("removed mid-walk"));
    }

    #[test]
    fn unreadable_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let list = |_: &Path| -> DirListing {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"))
        };
        let err = collect_files_with(dir.path(), &list).unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_files(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }

    #[test]
    fn scan_with_no_types_selected_posts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.png"), b"x");
        touch(&dir.path().join("b.jpg"), b"x");

        let results = Arc::new(MemoryResultSink::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let options = ScanOptions::new(results.clone(), notifier.clone()).with_workers(2);

        let summary = scan_directory(dir.path(), &JobSettings::new(), &options).unwrap();

        assert_eq!(summary.files_seen, 2);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.files_with_text, 0);
        assert!(results.results().is_empty());

        // One shutdown summary per worker.
        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.severity == Severity::Data));
    }

    #[cfg(unix)]
    #[test]
    fn scan_runs_tools_on_every_worker() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();

        let write_script = |name: &str, body: &str| {
            let path = bin.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        };
        let tools = ToolConfig {
            magick: write_script("magick", "for last; do :; done\ncp \"$1\" \"$last\""),
            tesseract: write_script("tesseract", "cat \"$1\""),
            timeout: Some(std::time::Duration::from_secs(30)),
            temp_dir: temp.path().to_path_buf(),
        };

        for i in 0..6 {
            touch(&data.path().join(format!("img{i}.png")), format!("text {i}").as_bytes());
        }
        touch(&data.path().join("blank.png"), b"   \n");
        touch(&data.path().join("notes.txt"), b"ignored");

        let mut settings = JobSettings::new();
        settings.set_image_type(ImageType::Png, true);
        settings.set_skip_resize(true);

        let results = Arc::new(MemoryResultSink::new());
        let options = ScanOptions::new(results.clone(), Arc::new(MemoryNotifier::new()))
            .with_workers(3)
            .with_tools(tools);

        let summary = scan_directory(data.path(), &settings, &options).unwrap();

        assert_eq!(summary.files_seen, 8);
        assert_eq!(summary.files_with_text, 6);
        assert_eq!(summary.files_without_text, 1);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_failed, 0);

        let mut texts: Vec<String> = results.results().into_iter().map(|r| r.keyword_text).collect();
        texts.sort();
        assert_eq!(texts[0], "text 0");
        assert_eq!(texts.len(), 6);
        assert!(results.results().iter().all(|r| r.job_id == summary.job_id));

        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
