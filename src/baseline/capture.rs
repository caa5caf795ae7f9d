//! Running a tool to capture its help output.

use std::io;
use std::path::Path;
use std::time::Duration;

use crate::domain::CommandSequence;
use crate::error::{Result, ToolsyncError};
use crate::process::run_with_timeout;

const HELP_FLAG: &str = "--help";

/// Raw result of one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutput {
    /// Captured stdout; `None` when the tool failed without printing anything
    pub stdout: Option<Vec<u8>>,
    pub exit_code: i32,
    pub stderr: Vec<u8>,
}

impl CaptureOutput {
    /// Nonzero exit that still produced output
    pub fn is_soft_failure(&self) -> bool {
        self.exit_code != 0 && self.stdout.is_some()
    }
}

/// Builds and runs capture command lines.
///
/// A command line is `wrapper + runner + sequence + --help`; the wrapper is
/// the sandbox exec prefix (if any) and the runner is the toolchain prefix.
#[derive(Debug, Clone)]
pub struct Capturer {
    runner: Vec<String>,
    wrapper: Vec<String>,
    timeout: Duration,
}

impl Capturer {
    pub fn new(runner: Vec<String>, timeout: Duration) -> Self {
        Self {
            runner,
            wrapper: Vec::new(),
            timeout,
        }
    }

    /// Prefix every command with a sandbox exec prefix.
    pub fn with_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Command line for `seq`.
    ///
    /// A raw script override runs as-is with the subcommand arguments and no
    /// runner or `--help`.
    pub fn build_argv(&self, seq: &CommandSequence, executable_override: Option<&Path>) -> Vec<String> {
        let mut argv = self.wrapper.clone();
        match executable_override {
            Some(script) => {
                argv.push(script.display().to_string());
                argv.extend(seq.subcommands().iter().cloned());
            }
            None => {
                argv.extend(self.runner.iter().cloned());
                argv.extend(seq.parts().iter().cloned());
                if !seq.parts().iter().any(|p| p == HELP_FLAG) {
                    argv.push(HELP_FLAG.to_string());
                }
            }
        }
        argv
    }

    /// Run the tool and classify its output.
    pub async fn capture(&self, seq: &CommandSequence, executable_override: Option<&Path>) -> Result<CaptureOutput> {
        let argv = self.build_argv(seq, executable_override);
        log::debug!("Capturing '{}': {:?}", seq, argv);

        let output = run_with_timeout(&argv, self.timeout).await.map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                ToolsyncError::CaptureTimeout {
                    sequence: seq.clone(),
                    timeout: self.timeout,
                }
            } else {
                ToolsyncError::Capture {
                    sequence: seq.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        // Killed by a signal has no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = if exit_code == 0 || !output.stdout.is_empty() {
            Some(output.stdout)
        } else {
            None
        };
        if exit_code != 0 {
            log::debug!("'{}' exited with {} (output captured: {})", seq, exit_code, stdout.is_some());
        }

        Ok(CaptureOutput {
            stdout,
            exit_code,
            stderr: output.stderr,
        })
    }
}
