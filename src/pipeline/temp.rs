//! Temporary files with guaranteed deletion.
//!
//! A [`TempScope`] is opened per processed file. Every path it hands out is
//! deleted when the scope is released or dropped, whichever exit path the
//! pipeline takes. Stages only ever see plain paths.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

/// Prefix of every temp file the pipeline creates.
pub const TEMP_PREFIX: &str = "ocr-ingest-";

/// Creates uniquely named, empty temp files in one directory.
#[derive(Debug, Clone)]
pub struct TempResource {
    dir: PathBuf,
}

impl TempResource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Temp files in the system temp directory.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new empty file ending in `suffix` (".png", ".JPG", or "").
    pub fn acquire(&self, suffix: &str) -> std::io::Result<TempFile> {
        let path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.dir)?
            .into_temp_path();
        tracing::debug!(path = %path.display(), "Temp file acquired");
        Ok(TempFile {
            location: path.to_path_buf(),
            path: Some(path),
        })
    }

    /// Open a scope whose files are all released together.
    pub fn scope(&self) -> TempScope<'_> {
        TempScope {
            resource: self,
            files: Vec::new(),
        }
    }
}

/// A temp file path plus the obligation to delete it.
#[derive(Debug)]
pub struct TempFile {
    location: PathBuf,
    path: Option<TempPath>,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.location
    }

    pub fn is_released(&self) -> bool {
        self.path.is_none()
    }

    /// Delete the file. Idempotent; a file that is already gone is fine.
    pub fn release(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match path.close() {
            Ok(()) => tracing::debug!(path = %self.location.display(), "Temp file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.location.display(),
                error = %e,
                "Failed to remove temp file"
            ),
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// All temp files acquired while processing one source file.
pub struct TempScope<'a> {
    resource: &'a TempResource,
    files: Vec<TempFile>,
}

impl TempScope<'_> {
    /// Acquire a temp file owned by this scope and return its path.
    pub fn acquire(&mut self, suffix: &str) -> std::io::Result<PathBuf> {
        let file = self.resource.acquire(suffix)?;
        let path = file.path().to_path_buf();
        self.files.push(file);
        Ok(path)
    }

    /// Number of files acquired through this scope so far.
    pub fn acquired(&self) -> usize {
        self.files.len()
    }

    /// Delete every file acquired so far. Safe to call more than once.
    pub fn release_all(&mut self) {
        for file in &mut self.files {
            file.release();
        }
    }
}

impl Drop for TempScope<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}
