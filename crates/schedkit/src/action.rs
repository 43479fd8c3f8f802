//! Install actions - the pluggable seam between the scheduler and the
//! outside world.
//!
//! The scheduler never shells out directly; it runs [`InstallAction`]
//! implementations. Production plans use [`CommandAction`], which wraps an
//! external installer command. Tests substitute in-process actions.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::types::CommandOutput;

/// How often a timed action polls its child process.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Something the scheduler can execute to install a unit.
///
/// Implementations must be callable from worker threads. `run` blocks until
/// the action completes, fails, or times out; the scheduler has no other
/// suspension points.
pub trait InstallAction: Send + Sync {
    /// Execute the action, capturing its output.
    ///
    /// A non-zero exit or timeout is an `Err` so the retry policy can
    /// classify it; `Ok` always means the unit succeeded.
    fn run(&self) -> Result<CommandOutput>;

    /// One-line description for dry-run output and logs.
    fn describe(&self) -> String;
}

/// An external installer command with an optional timeout.
#[derive(Debug, Clone)]
pub struct CommandAction {
    /// Program to execute (e.g. "apt-get", "brew")
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Kill the process and fail with a timeout error after this long
    pub timeout: Option<Duration>,
    /// Unit name used when classifying failures from stderr
    pub unit_name: Option<String>,
}

impl CommandAction {
    /// Create a command action.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
            unit_name: None,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the unit name used in error classification.
    pub fn with_unit_name(mut self, name: impl Into<String>) -> Self {
        self.unit_name = Some(name.into());
        self
    }

    /// Wait for the child, enforcing the timeout by polling `try_wait`.
    ///
    /// stdout/stderr are drained on reader threads for the whole wait: a
    /// child that writes more than the OS pipe buffer would otherwise block
    /// on the full pipe, never exit, and be misreported as a timeout.
    fn wait_with_timeout(
        &self,
        mut child: std::process::Child,
        limit: Duration,
    ) -> Result<std::process::Output> {
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(std::process::Output {
                    status,
                    stdout: stdout_reader.join().unwrap_or_default(),
                    stderr: stderr_reader.join().unwrap_or_default(),
                });
            }
            if start.elapsed() >= limit {
                // Best-effort kill; the process may have exited already
                let _ = child.kill();
                let _ = child.wait();
                // Killing the child closes its pipes, so the readers finish
                let _ = stdout_reader.join();
                let _ = stderr_reader.join();
                return Err(Error::Timeout {
                    seconds: limit.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Read a child pipe to the end on a helper thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl InstallAction for CommandAction {
    fn run(&self) -> Result<CommandOutput> {
        log::debug!("running: {} {}", self.program, self.args.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match self.timeout {
            Some(limit) => self.wait_with_timeout(cmd.spawn()?, limit)?,
            None => cmd.output()?,
        };

        let captured = CommandOutput::from(output);
        if captured.success {
            Ok(captured)
        } else {
            Err(Error::from_command_output(
                &captured.stderr,
                self.unit_name.as_deref(),
            ))
        }
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn sh(script: &str) -> CommandAction {
        CommandAction::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_command_success_captures_stdout() {
        let output = sh("echo hello").run().unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_command_failure_classified_from_stderr() {
        let action = sh("echo 'E: Unable to locate package nope' >&2; exit 100")
            .with_unit_name("nope");
        let err = action.run().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_command_failure_fallback_category() {
        let err = sh("exit 1").run().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Other);
    }

    #[test]
    fn test_chatty_command_finishes_within_timeout() {
        // Well past the ~64 KiB pipe buffer; must not stall on a full pipe
        let action = sh(
            "i=0; while [ $i -lt 20000 ]; do \
             echo 0123456789012345678901234567890123456789012345678901234567890123; \
             i=$((i+1)); done",
        )
        .with_timeout(Duration::from_secs(30));

        let output = action.run().unwrap();
        assert!(output.success);
        assert!(output.stdout.len() > 1_000_000);
    }

    #[test]
    fn test_command_timeout() {
        let action = sh("sleep 5").with_timeout(Duration::from_millis(100));
        let err = action.run().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn test_describe() {
        let action = CommandAction::new("brew", vec!["install".into(), "git".into()]);
        assert_eq!(action.describe(), "brew install git");
    }
}
