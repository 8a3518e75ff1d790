//! External command execution.
//!
//! [`ToolInvoker`] runs one child process per call, drains stdout and stderr
//! concurrently while waiting for exit, and kills the child when a timeout
//! elapses. A non-zero exit is an ordinary [`ToolOutcome`]; only failing to
//! start the program or running out of time is an error.
//!
//! Calls block the calling thread. The invoker owns a small current-thread
//! runtime for the process and timer drivers, so it must not be called from
//! inside another async runtime.

use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{program} not found. Please ensure it is installed and in your PATH")]
    NotFound { program: String },

    #[error("{program} did not finish within {after:?} and was killed")]
    Timeout { program: String, after: Duration },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not build process runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ToolError {
    /// Failures the operator fixes by changing the environment (installing
    /// the tool, fixing permissions), as opposed to per-file trouble.
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Spawn { .. } | Self::Runtime(_))
    }
}

/// How a finished process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDescription {
    Code(i32),
    /// Terminated by a signal (Unix), so no exit code exists.
    Signal,
}

impl std::fmt::Display for ExitDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "code {code}"),
            Self::Signal => write!(f, "a signal"),
        }
    }
}

/// Captured result of one finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn exit(&self) -> ExitDescription {
        self.exit_code
            .map(ExitDescription::Code)
            .unwrap_or(ExitDescription::Signal)
    }
}

/// Command execution abstraction (allows scripted runners in tests).
pub trait ToolRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<ToolOutcome, ToolError>;
}

/// Runs real child processes.
pub struct ToolInvoker {
    runtime: tokio::runtime::Runtime,
}

impl ToolInvoker {
    pub fn new() -> Result<Self, ToolError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ToolError::Runtime)?;
        Ok(Self { runtime })
    }
}

impl ToolRunner for ToolInvoker {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<ToolOutcome, ToolError> {
        tracing::debug!(program, args = ?args, timeout = ?timeout, "Running external tool");
        self.runtime.block_on(run_child(program, args, timeout))
    }
}

async fn run_child(
    program: &str,
    args: &[OsString],
    timeout: Option<Duration>,
) -> Result<ToolOutcome, ToolError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound {
                program: program.to_string(),
            },
            _ => ToolError::Spawn {
                program: program.to_string(),
                source,
            },
        })?;

    let collected = match timeout {
        Some(limit) => {
            let waited = tokio::time::timeout(limit, collect_output(&mut child)).await;
            match waited {
                Ok(collected) => collected,
                Err(_elapsed) => {
                    // kill() also reaps the child
                    if let Err(e) = child.kill().await {
                        tracing::warn!(program, error = %e, "Failed to kill timed-out tool");
                    }
                    return Err(ToolError::Timeout {
                        program: program.to_string(),
                        after: limit,
                    });
                }
            }
        }
        None => collect_output(&mut child).await,
    };

    let (status, stdout, stderr) = collected.map_err(|source| ToolError::Io {
        program: program.to_string(),
        source,
    })?;

    Ok(ToolOutcome {
        exit_code: status.code(),
        stdout,
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Wait for exit while reading both pipes to the end, so a chatty child can
/// never block on a full pipe buffer.
async fn collect_output(
    child: &mut Child,
) -> std::io::Result<(std::process::ExitStatus, Vec<u8>, Vec<u8>)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stdout {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };
    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let (status, out, err) = tokio::try_join!(child.wait(), read_stdout, read_stderr)?;
    Ok((status, out, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn outcome_success_only_on_zero() {
        let mut outcome = ToolOutcome {
            exit_code: Some(0),
            stdout: vec![],
            stderr: String::new(),
        };
        assert!(outcome.success());
        assert_eq!(outcome.exit(), ExitDescription::Code(0));

        outcome.exit_code = Some(2);
        assert!(!outcome.success());

        outcome.exit_code = None;
        assert!(!outcome.success());
        assert_eq!(outcome.exit().to_string(), "a signal");
    }

    #[test]
    fn missing_program_is_not_found() {
        let invoker = ToolInvoker::new().unwrap();
        let result = invoker.run("ocr-ingest-no-such-tool-7f3a", &[], None);
        assert!(matches!(result, Err(ToolError::NotFound { ref program }) if program == "ocr-ingest-no-such-tool-7f3a"));
        assert!(result.unwrap_err().is_environment());
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let invoker = ToolInvoker::new().unwrap();
        let outcome = invoker
            .run(
                "sh",
                &args(&["-c", "printf 'Hello World\\n'; printf 'bad input' >&2; exit 3"]),
                Some(Duration::from_secs(10)),
            )
            .unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout, b"Hello World\n");
        assert_eq!(outcome.stderr, "bad input");
        assert!(!outcome.success());
    }

    #[cfg(unix)]
    #[test]
    fn drains_output_larger_than_pipe_buffer() {
        let invoker = ToolInvoker::new().unwrap();
        // 1 MiB on each pipe, well past the usual 64 KiB pipe capacity
        let outcome = invoker
            .run(
                "sh",
                &args(&[
                    "-c",
                    "head -c 1048576 /dev/zero; head -c 1048576 /dev/zero >&2",
                ]),
                Some(Duration::from_secs(30)),
            )
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.len(), 1_048_576);
        assert_eq!(outcome.stderr.len(), 1_048_576);
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 2; touch '{}'", marker.display());

        let invoker = ToolInvoker::new().unwrap();
        let started = std::time::Instant::now();
        let result = invoker.run("sh", &args(&["-c", script.as_str()]), Some(Duration::from_millis(200)));

        assert!(matches!(result, Err(ToolError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!result.unwrap_err().is_environment());

        // The killed shell must never get to create the marker.
        std::thread::sleep(Duration::from_millis(2500));
        assert!(!marker.exists(), "timed-out child kept running");
    }

    #[cfg(unix)]
    #[test]
    fn no_timeout_waits_for_completion() {
        let invoker = ToolInvoker::new().unwrap();
        let outcome = invoker
            .run("sh", &args(&["-c", "sleep 0.1; echo done"]), None)
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout, b"done\n");
    }

    #[cfg(unix)]
    #[test]
    fn invalid_utf8_stderr_is_lossy() {
        let invoker = ToolInvoker::new().unwrap();
        let outcome = invoker
            .run("sh", &args(&["-c", "printf 'a\\377b' >&2"]), None)
            .unwrap();
        assert_eq!(outcome.stderr, "a\u{FFFD}b");
    }
}
