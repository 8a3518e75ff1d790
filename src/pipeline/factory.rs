use std::sync::Arc;

use super::ingest::IngestPipeline;
use super::sink::{NotificationSink, ResultSink};
use super::tool::{ToolError, ToolInvoker};
use crate::config::{ToolConfig, APP_DESCRIPTION, APP_NAME, MODULE_VERSION};
use crate::settings::JobSettings;

/// Builds one [`IngestPipeline`] per worker. All pipelines share the
/// factory's sinks and tool configuration.
pub struct OcrModuleFactory {
    tools: ToolConfig,
    results: Arc<dyn ResultSink + Send + Sync>,
    notifier: Arc<dyn NotificationSink + Send + Sync>,
}

impl OcrModuleFactory {
    pub fn new(
        tools: ToolConfig,
        results: Arc<dyn ResultSink + Send + Sync>,
        notifier: Arc<dyn NotificationSink + Send + Sync>,
    ) -> Self {
        Self {
            tools,
            results,
            notifier,
        }
    }

    pub fn display_name() -> &'static str {
        APP_NAME
    }

    pub fn description() -> &'static str {
        APP_DESCRIPTION
    }

    pub fn version() -> &'static str {
        MODULE_VERSION
    }

    /// Settings a new job starts from: no image types, English.
    pub fn default_settings() -> JobSettings {
        let mut settings = JobSettings::new();
        settings.normalize();
        settings
    }

    pub fn tools(&self) -> &ToolConfig {
        &self.tools
    }

    /// Fresh pipeline with its own process runtime and counters.
    pub fn create_module(&self) -> Result<IngestPipeline, ToolError> {
        let invoker = ToolInvoker::new()?;
        Ok(IngestPipeline::new(
            Box::new(invoker),
            &self.tools,
            self.results.clone(),
            self.notifier.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sink::{MemoryNotifier, MemoryResultSink};
    use crate::settings::{keys, Config};

    #[test]
    fn descriptor() {
        assert_eq!(OcrModuleFactory::display_name(), "OCR Ingest Module (Tesseract)");
        assert_eq!(OcrModuleFactory::version(), "4.10");
        assert!(!OcrModuleFactory::description().is_empty());
    }

    #[test]
    fn default_settings_select_nothing_in_english() {
        let settings = OcrModuleFactory::default_settings();
        assert_eq!(settings.get_setting(keys::LANGUAGE_CODE), Some("eng"));

        let config = Config::from_settings(&settings);
        assert!(config.is_empty());
        assert_eq!(config.language_code, "eng");
    }

    #[test]
    fn default_job_converts_without_resize() {
        let config = Config::from_settings(&OcrModuleFactory::default_settings());
        let args = crate::pipeline::PreprocessStage::build_args(
            std::path::Path::new("in.jpg"),
            std::path::Path::new("out.png"),
            &config,
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["in.jpg", "out.png"]);
    }

    #[test]
    fn modules_start_with_clean_counters() {
        let factory = OcrModuleFactory::new(
            ToolConfig::default(),
            Arc::new(MemoryResultSink::new()),
            Arc::new(MemoryNotifier::new()),
        );
        let a = factory.create_module().unwrap();
        let b = factory.create_module().unwrap();
        assert_eq!(a.counters(), b.counters());
        assert_eq!(a.counters().processed_with_text, 0);
    }
}
