//! Persisted job settings and the typed snapshot derived from them.
//!
//! Settings are stored the way the ingest host stores module settings: a flat
//! map of string keys to string values. That untyped representation stays
//! inside this module. Everything downstream consumes [`Config`], produced by
//! one explicit parse step at job start.

pub mod options;

pub use options::*;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted setting keys.
pub mod keys {
    pub const JPG_FLAG: &str = "jpg_flag";
    pub const PNG_FLAG: &str = "png_flag";
    pub const TIF_FLAG: &str = "tif_flag";
    pub const BMP_FLAG: &str = "bmp_flag";
    pub const GIF_FLAG: &str = "gif_flag";
    pub const GRAYSCALE_FLAG: &str = "grayscale_flag";
    pub const SKIP_RESIZE_FLAG: &str = "skip_resize_flag";
    pub const RESIZE_VALUE: &str = "resize_value";
    pub const LANGUAGE_CODE: &str = "language_code";
}

const TRUE: &str = "true";
const FALSE: &str = "false";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not a flat JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flat key/value job settings, as edited between jobs.
///
/// Unknown keys are preserved so a settings file shared with other modules
/// round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSettings {
    values: BTreeMap<String, String>,
}

impl JobSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "Job settings loaded");
        Ok(settings)
    }

    /// Write settings as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set_setting(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// A flag counts as set only when stored as exactly `"true"`.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.get_setting(key) == Some(TRUE)
    }

    fn set_flag(&mut self, key: &str, enabled: bool) {
        self.set_setting(key, if enabled { TRUE } else { FALSE });
    }

    pub fn set_image_type(&mut self, image_type: ImageType, enabled: bool) {
        self.set_flag(image_type.setting_key(), enabled);
    }

    pub fn set_grayscale(&mut self, enabled: bool) {
        self.set_flag(keys::GRAYSCALE_FLAG, enabled);
    }

    /// Toggle resizing. Re-enabling resize without a stored percentage
    /// stores 100%.
    pub fn set_skip_resize(&mut self, skip: bool) {
        self.set_flag(keys::SKIP_RESIZE_FLAG, skip);
        let has_value = self
            .get_setting(keys::RESIZE_VALUE)
            .is_some_and(|v| !v.is_empty());
        if !skip && !has_value {
            self.set_setting(keys::RESIZE_VALUE, ResizePercent::default().value());
        }
    }

    pub fn set_resize(&mut self, percent: ResizePercent) {
        self.set_setting(keys::RESIZE_VALUE, percent.value());
    }

    pub fn set_language(&mut self, language: Language) {
        self.set_setting(keys::LANGUAGE_CODE, language.code());
    }

    /// Apply load-time defaults: a missing or unrecognised language is
    /// stored as English.
    pub fn normalize(&mut self) {
        let language_ok = self
            .get_setting(keys::LANGUAGE_CODE)
            .is_some_and(|code| code.parse::<Language>().is_ok());
        if !language_ok {
            self.set_language(Language::default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_require_literal_true() {
        let settings = JobSettings::from_pairs([
            (keys::JPG_FLAG, "true"),
            (keys::PNG_FLAG, "TRUE"),
            (keys::TIF_FLAG, "1"),
        ]);
        assert!(settings.is_enabled(keys::JPG_FLAG));
        assert!(!settings.is_enabled(keys::PNG_FLAG));
        assert!(!settings.is_enabled(keys::TIF_FLAG));
        assert!(!settings.is_enabled(keys::GIF_FLAG));
    }

    #[test]
    fn setters_store_string_values() {
        let mut settings = JobSettings::new();
        settings.set_image_type(ImageType::Tif, true);
        settings.set_grayscale(false);
        settings.set_resize(ResizePercent::P75);
        settings.set_language(Language::Deu);

        assert_eq!(settings.get_setting(keys::TIF_FLAG), Some("true"));
        assert_eq!(settings.get_setting(keys::GRAYSCALE_FLAG), Some("false"));
        assert_eq!(settings.get_setting(keys::RESIZE_VALUE), Some("75"));
        assert_eq!(settings.get_setting(keys::LANGUAGE_CODE), Some("deu"));
    }

    #[test]
    fn enabling_resize_without_value_stores_100() {
        let mut settings = JobSettings::new();
        settings.set_skip_resize(false);
        assert_eq!(settings.get_setting(keys::SKIP_RESIZE_FLAG), Some("false"));
        assert_eq!(settings.get_setting(keys::RESIZE_VALUE), Some("100"));
    }

    #[test]
    fn enabling_resize_keeps_existing_value() {
        let mut settings = JobSettings::new();
        settings.set_resize(ResizePercent::P25);
        settings.set_skip_resize(true);
        settings.set_skip_resize(false);
        assert_eq!(settings.get_setting(keys::RESIZE_VALUE), Some("25"));
    }

    #[test]
    fn skipping_resize_does_not_invent_value() {
        let mut settings = JobSettings::new();
        settings.set_skip_resize(true);
        assert_eq!(settings.get_setting(keys::RESIZE_VALUE), None);
    }

    #[test]
    fn normalize_defaults_language_to_english() {
        let mut missing = JobSettings::new();
        missing.normalize();
        assert_eq!(missing.get_setting(keys::LANGUAGE_CODE), Some("eng"));

        let mut unknown = JobSettings::from_pairs([(keys::LANGUAGE_CODE, "klingon")]);
        unknown.normalize();
        assert_eq!(unknown.get_setting(keys::LANGUAGE_CODE), Some("eng"));

        let mut known = JobSettings::from_pairs([(keys::LANGUAGE_CODE, "spa")]);
        known.normalize();
        assert_eq!(known.get_setting(keys::LANGUAGE_CODE), Some("spa"));
    }

    #[test]
    fn save_and_load_preserve_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = JobSettings::from_pairs([("other_module_key", "kept")]);
        settings.set_image_type(ImageType::Png, true);
        settings.save(&path).unwrap();

        let loaded = JobSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.get_setting("other_module_key"), Some("kept"));
    }

    #[test]
    fn load_rejects_non_string_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"jpg_flag": true}"#).unwrap();

        let result = JobSettings::load(&path);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = JobSettings::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }
}
