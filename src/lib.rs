pub mod config;
pub mod host;
pub mod pipeline;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use host::{HostError, ScanOptions, ScanSummary};
use pipeline::{JsonlResultSink, LogNotifier, OcrModuleFactory};
use settings::JobSettings;

/// Run the OCR ingest module over a directory tree.
#[derive(Parser, Debug)]
#[command(name = "ocr-ingest", version, about, long_about = None)]
pub struct Cli {
    /// Directory to scan recursively
    pub directory: PathBuf,

    /// Job settings file (JSON object of string values)
    pub settings: Option<PathBuf>,

    /// Result file, one JSON object per line
    pub results: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

pub fn run() -> Result<ScanSummary, HostError> {
    init_tracing();
    let cli = Cli::parse();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let settings = match &cli.settings {
        Some(path) => JobSettings::load(path)?,
        None => OcrModuleFactory::default_settings(),
    };

    let results_path = cli.results.unwrap_or_else(config::default_results_path);
    let results = Arc::new(JsonlResultSink::open(&results_path)?);
    tracing::info!(path = %results.path().display(), "Writing results");

    let mut options = ScanOptions::new(results, Arc::new(LogNotifier))
        .with_tools(config::ToolConfig::from_env());
    if let Some(workers) = cli.workers {
        options = options.with_workers(workers);
    }

    host::scan_directory(&cli.directory, &settings, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_positional_arguments() {
        let cli = Cli::try_parse_from(["ocr-ingest", "/evidence", "job.json", "out.jsonl", "-w", "2"])
            .unwrap();
        assert_eq!(cli.directory, PathBuf::from("/evidence"));
        assert_eq!(cli.settings, Some(PathBuf::from("job.json")));
        assert_eq!(cli.results, Some(PathBuf::from("out.jsonl")));
        assert_eq!(cli.workers, Some(2));
    }

    #[test]
    fn cli_requires_directory() {
        assert!(Cli::try_parse_from(["ocr-ingest"]).is_err());

        let cli = Cli::try_parse_from(["ocr-ingest", "."]).unwrap();
        assert!(cli.settings.is_none());
        assert!(cli.results.is_none());
    }
}
