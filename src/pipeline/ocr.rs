//! Text recognition through the Tesseract CLI.
//!
//! Command shape: `tesseract <image> stdout [-l <lang>]`

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use super::tool::{ToolOutcome, ToolRunner};
use super::IngestError;
use crate::settings::Config;

pub struct OcrStage {
    program: String,
    timeout: Option<Duration>,
}

impl OcrStage {
    pub const NAME: &'static str = "Tesseract";

    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn build_args(image: &Path, config: &Config) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![image.into(), "stdout".into()];
        if !config.language_code.is_empty() {
            args.push("-l".into());
            args.push(config.language_code.as_str().into());
        }
        args
    }

    /// Recognise text in `image`.
    ///
    /// The text is only meaningful when the outcome succeeded. It is decoded
    /// leniently and trimmed; an empty string means no text was found.
    pub fn run(
        &self,
        runner: &dyn ToolRunner,
        image: &Path,
        config: &Config,
    ) -> Result<(String, ToolOutcome), IngestError> {
        let args = Self::build_args(image, config);
        let outcome = runner.run(&self.program, &args, self.timeout)?;

        let text = if outcome.success() {
            decode_text(&outcome.stdout)
        } else {
            String::new()
        };
        Ok((text, outcome))
    }
}

/// Decode tool output as UTF-8, dropping invalid byte sequences, and trim
/// surrounding whitespace.
pub fn decode_text(bytes: &[u8]) -> String {
    let mut decoded = String::with_capacity(bytes.len());
    let mut dropped = 0usize;
    for chunk in bytes.utf8_chunks() {
        decoded.push_str(chunk.valid());
        dropped += chunk.invalid().len();
    }
    if dropped > 0 {
        tracing::debug!(dropped_bytes = dropped, "Dropped invalid UTF-8 from OCR output");
    }
    decoded.trim().to_string()
}
