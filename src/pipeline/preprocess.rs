//! Image normalization through ImageMagick.
//!
//! Command shape:
//! `magick <input> [-grayscale Rec709Luminance] [-resize <N>%] <output.png>`

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::temp::TempScope;
use super::tool::{ToolOutcome, ToolRunner};
use super::IngestError;
use crate::settings::Config;

/// Output format of the normalized image (lossless, readable by Tesseract).
pub const NORMALIZED_SUFFIX: &str = ".png";

const GRAYSCALE_METHOD: &str = "Rec709Luminance";

pub struct PreprocessStage {
    program: String,
    timeout: Option<Duration>,
}

impl PreprocessStage {
    pub const NAME: &'static str = "ImageMagick";

    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument list (without the program) for one conversion.
    pub fn build_args(input: &Path, output: &Path, config: &Config) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![input.into()];

        if config.grayscale {
            args.push("-grayscale".into());
            args.push(GRAYSCALE_METHOD.into());
        }

        if !config.skip_resize {
            args.push("-resize".into());
            args.push(format!("{}%", config.resize_percent.percent()).into());
        }

        args.push(output.into());
        args
    }

    /// Convert `input` into a fresh PNG owned by `temps`.
    ///
    /// Returns the output path and the raw outcome; a non-zero exit is left
    /// for the caller to judge.
    pub fn run(
        &self,
        runner: &dyn ToolRunner,
        temps: &mut TempScope<'_>,
        input: &Path,
        config: &Config,
    ) -> Result<(PathBuf, ToolOutcome), IngestError> {
        let output = temps
            .acquire(NORMALIZED_SUFFIX)
            .map_err(IngestError::TempFile)?;
        let args = Self::build_args(input, &output, config);

        let outcome = runner.run(&self.program, &args, self.timeout)?;
        Ok((output, outcome))
    }
}
