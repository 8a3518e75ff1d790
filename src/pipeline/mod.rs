pub mod tool;
pub mod temp;
pub mod source;
pub mod eligibility;
pub mod preprocess;
pub mod ocr;
pub mod sink;
pub mod ingest;
pub mod factory;

pub use tool::*;
pub use temp::*;
pub use source::*;
pub use eligibility::*;
pub use preprocess::*;
pub use ocr::*;
pub use sink::*;
pub use ingest::*;
pub use factory::*;

use thiserror::Error;

/// Per-file failures. All of them are recoverable at file granularity:
/// the orchestrator logs them and moves on to the next file.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Could not read source content: {0}")]
    SourceRead(#[source] std::io::Error),

    #[error("Temporary file error: {0}")]
    TempFile(#[source] std::io::Error),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{tool} exited with {exit}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        exit: ExitDescription,
        stderr: String,
    },

    #[error("Could not post result: {0}")]
    ResultPosting(#[from] SinkError),
}

impl IngestError {
    /// Severe failures point at the environment or the result store and are
    /// logged at error level; the rest are logged as warnings.
    pub fn is_severe(&self) -> bool {
        match self {
            Self::SourceRead(_) | Self::TempFile(_) | Self::ResultPosting(_) => true,
            Self::Tool(e) => e.is_environment(),
            Self::ToolFailed { .. } => false,
        }
    }
}
