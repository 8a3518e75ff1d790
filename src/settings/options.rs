use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{keys, JobSettings};

// ── Enums ──────────────────────────────────────────────────────

/// Image families the operator can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Jpg,
    Png,
    Tif,
    Bmp,
    Gif,
}

impl ImageType {
    pub const ALL: [ImageType; 5] = [Self::Jpg, Self::Png, Self::Tif, Self::Bmp, Self::Gif];

    pub fn setting_key(&self) -> &'static str {
        match self {
            Self::Jpg => keys::JPG_FLAG,
            Self::Png => keys::PNG_FLAG,
            Self::Tif => keys::TIF_FLAG,
            Self::Bmp => keys::BMP_FLAG,
            Self::Gif => keys::GIF_FLAG,
        }
    }

    /// Lower-case, dot-prefixed extensions covered by this type.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Jpg => &[".jpg", ".jpeg"],
            Self::Png => &[".png"],
            Self::Tif => &[".tif", ".tiff"],
            Self::Bmp => &[".bmp"],
            Self::Gif => &[".gif"],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Jpg => "Process JPG/JPEG images",
            Self::Png => "Process PNG images",
            Self::Tif => "Process TIFF images",
            Self::Bmp => "Process BMP images",
            Self::Gif => "Process GIF images",
        }
    }
}

/// Resize percentages offered to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizePercent {
    P25,
    P50,
    P75,
    #[default]
    P100,
}

impl ResizePercent {
    pub const ALL: [ResizePercent; 4] = [Self::P25, Self::P50, Self::P75, Self::P100];

    pub fn percent(&self) -> u32 {
        match self {
            Self::P25 => 25,
            Self::P50 => 50,
            Self::P75 => 75,
            Self::P100 => 100,
        }
    }

    /// Stored form, without the `%` sign.
    pub fn value(&self) -> &'static str {
        match self {
            Self::P25 => "25",
            Self::P50 => "50",
            Self::P75 => "75",
            Self::P100 => "100",
        }
    }

    /// Parse a stored value; anything unrecognised (or missing) reads as 100%.
    pub fn from_setting(raw: Option<&str>) -> Self {
        raw.and_then(|v| v.trim().trim_end_matches('%').parse().ok())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for ResizePercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

impl FromStr for ResizePercent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "25" => Ok(Self::P25),
            "50" => Ok(Self::P50),
            "75" => Ok(Self::P75),
            "100" => Ok(Self::P100),
            other => Err(format!("Invalid resize value: {other}")),
        }
    }
}

/// Tesseract languages offered to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Eng,
    Srp,
    Deu,
    Fra,
    Spa,
}

impl Language {
    pub const ALL: [Language; 5] = [Self::Eng, Self::Srp, Self::Deu, Self::Fra, Self::Spa];

    /// Tesseract traineddata code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Eng => "eng",
            Self::Srp => "srp",
            Self::Deu => "deu",
            Self::Fra => "fra",
            Self::Spa => "spa",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Eng => "English (eng)",
            Self::Srp => "Serbian (srp)",
            Self::Deu => "German (deu)",
            Self::Fra => "French (fra)",
            Self::Spa => "Spanish (spa)",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Language {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eng" => Ok(Self::Eng),
            "srp" => Ok(Self::Srp),
            "deu" => Ok(Self::Deu),
            "fra" => Ok(Self::Fra),
            "spa" => Ok(Self::Spa),
            other => Err(format!("Invalid language code: {other}")),
        }
    }
}

// ── Typed snapshot ─────────────────────────────────────────────

/// Operator options for one ingest job.
///
/// Built once in `start_up` and never mutated while files are processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Lower-cased, dot-prefixed (".jpg").
    pub accepted_extensions: BTreeSet<String>,
    pub grayscale: bool,
    pub skip_resize: bool,
    /// Only meaningful when `skip_resize` is false.
    pub resize_percent: ResizePercent,
    /// Empty means "let Tesseract use its own default".
    pub language_code: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accepted_extensions: BTreeSet::new(),
            grayscale: false,
            skip_resize: true,
            resize_percent: ResizePercent::default(),
            language_code: Language::default().code().to_string(),
        }
    }
}

impl Config {
    /// Parse persisted settings into a typed snapshot.
    ///
    /// Missing flags read as off. Resizing only happens when
    /// `skip_resize_flag` is exactly `"false"`, so a job that never touched
    /// the resize controls sends no resize to ImageMagick. An unrecognised
    /// resize value reads as 100%, and an unrecognised language falls back
    /// to English.
    pub fn from_settings(settings: &JobSettings) -> Self {
        let accepted_extensions = ImageType::ALL
            .iter()
            .filter(|t| settings.is_enabled(t.setting_key()))
            .flat_map(|t| t.extensions().iter().map(|e| e.to_string()))
            .collect();

        let language = match settings.get_setting(keys::LANGUAGE_CODE) {
            None | Some("") => Language::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "Falling back to English OCR language");
                Language::default()
            }),
        };

        Self {
            accepted_extensions,
            grayscale: settings.is_enabled(keys::GRAYSCALE_FLAG),
            skip_resize: settings.get_setting(keys::SKIP_RESIZE_FLAG) != Some("false"),
            resize_percent: ResizePercent::from_setting(settings.get_setting(keys::RESIZE_VALUE)),
            language_code: language.code().to_string(),
        }
    }

    /// True when no image type is selected, i.e. the job will not OCR anything.
    pub fn is_empty(&self) -> bool {
        self.accepted_extensions.is_empty()
    }

    /// `extension` must already be lower-cased and dot-prefixed.
    pub fn accepts(&self, extension: &str) -> bool {
        self.accepted_extensions.contains(extension)
    }
}
