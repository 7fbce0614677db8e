//! Synchronous git command runner with a wall-clock timeout.
//!
//! Every invocation is bounded: when the budget runs out the child is killed
//! and [`HarvestError::Timeout`] is returned for that one operation. Output is
//! drained on helper threads so a chatty child can never block on a full pipe.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::HarvestError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STDERR_LIMIT: usize = 260;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl GitOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct GitRunner {
    program: String,
    timeout: Duration,
}

impl GitRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Same program, different budget (fetches get a longer one).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            program: self.program.clone(),
            timeout,
        }
    }

    /// Run something other than `git`; used by tests.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run and return stdout bytes; non-zero exit is [`HarvestError::Git`].
    pub fn bytes(&self, cwd: Option<&Path>, args: &[&str]) -> Result<Vec<u8>, HarvestError> {
        let out = self.probe(cwd, args)?;
        if !out.success {
            return Err(HarvestError::Git {
                command: args.join(" "),
                stderr: if out.stderr.is_empty() {
                    "command failed".to_string()
                } else {
                    out.stderr
                },
            });
        }
        Ok(out.stdout)
    }

    /// Run and return stdout as (lossy) UTF-8 text.
    pub fn text(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String, HarvestError> {
        let bytes = self.bytes(cwd, args)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Run without treating a non-zero exit as an error.
    ///
    /// Spawn failures and timeouts are still errors.
    pub fn probe(&self, cwd: Option<&Path>, args: &[&str]) -> Result<GitOutput, HarvestError> {
        let command = args.join(" ");
        tracing::debug!("{} {command}", self.program);

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| HarvestError::Spawn {
            command: command.clone(),
            source,
        })?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!("{} {command} timed out", self.program);
                    return Err(HarvestError::Timeout {
                        command,
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(HarvestError::Spawn { command, source }),
            }
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        Ok(GitOutput {
            success: status.success(),
            stdout,
            stderr: truncate_chars(String::from_utf8_lossy(&stderr).trim(), STDERR_LIMIT),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
