use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "OCR Ingest Module (Tesseract)";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str =
    "Performs Tesseract OCR on images and saves the result for keyword searching.";

/// Module version reported to the ingest host (kept separate from the crate version).
pub const MODULE_VERSION: &str = "4.10";

/// Default ImageMagick executable name, resolved through PATH.
pub const DEFAULT_MAGICK: &str = "magick";

/// Default Tesseract executable name, resolved through PATH.
pub const DEFAULT_TESSERACT: &str = "tesseract";

/// Per-call timeout applied to each external tool unless overridden.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// Environment overrides
pub const ENV_MAGICK: &str = "OCR_INGEST_MAGICK";
pub const ENV_TESSERACT: &str = "OCR_INGEST_TESSERACT";
pub const ENV_TOOL_TIMEOUT: &str = "OCR_INGEST_TOOL_TIMEOUT_SECS";
pub const ENV_TEMP_DIR: &str = "OCR_INGEST_TEMP_DIR";

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "ocr_ingest=info"
}

/// Get the application data directory (default location for results).
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ocr-ingest")
}

/// Default path of the JSON-lines result store written by the binary.
pub fn default_results_path() -> PathBuf {
    app_data_dir().join("results.jsonl")
}

/// Locations and limits for the two external tools.
///
/// Read once per process from the environment; the pipeline treats it as
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub magick: String,
    pub tesseract: String,
    /// `None` waits for the tool indefinitely.
    pub timeout: Option<Duration>,
    pub temp_dir: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            magick: DEFAULT_MAGICK.to_string(),
            tesseract: DEFAULT_TESSERACT.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl ToolConfig {
    /// Build from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout = match get(ENV_TOOL_TIMEOUT) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(
                        value = %raw,
                        default = DEFAULT_TOOL_TIMEOUT_SECS,
                        "Invalid {ENV_TOOL_TIMEOUT}, using default"
                    );
                    defaults.timeout
                }
            },
            None => defaults.timeout,
        };

        Self {
            magick: get(ENV_MAGICK).unwrap_or(defaults.magick),
            tesseract: get(ENV_TESSERACT).unwrap_or(defaults.tesseract),
            timeout,
            temp_dir: get(ENV_TEMP_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
        }
    }
}
