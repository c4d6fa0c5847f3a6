// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Content generators for [`crate::transform::ContentView`].

use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{FsError, FsResult, ResultExt};

/// Produces the visible bytes of a file from its source bytes.
#[cfg_attr(test, mockall::automock)]
pub trait ContentGenerator: Send + Sync {
    fn generate(&self, path: &str, source: &[u8]) -> FsResult<Vec<u8>>;
}

impl<F> ContentGenerator for F
where
    F: Fn(&str, &[u8]) -> FsResult<Vec<u8>> + Send + Sync,
{
    fn generate(&self, path: &str, source: &[u8]) -> FsResult<Vec<u8>> {
        self(path, source)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const MAX_STDERR_CHARS: usize = 4000;

/// Pipes the source through an external command and returns its stdout.
///
/// The child is killed when it outlives the timeout. A non-zero exit is an
/// I/O error carrying the (abbreviated) stderr.
#[derive(Clone, Debug)]
pub struct ProcessGenerator {
    command: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ProcessGenerator {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        // Read errors surface through the exit status.
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Keeps at most `max` characters, marking the cut with `...`.
fn abbreviate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

impl ContentGenerator for ProcessGenerator {
    fn generate(&self, path: &str, source: &[u8]) -> FsResult<Vec<u8>> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| FsError::InvalidPath("empty generator command".to_string()))?;
        debug!(target: "fusebox::view", path, command = %self.command_line(), "running generator");

        let mut child = Command::new(program)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(format!("failed to spawn {}", self.command_line()))?;

        let stdin = child.stdin.take();
        let input = source.to_vec();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // The child may exit without reading everything.
                let _ = stdin.write_all(&input);
            }
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let start = Instant::now();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if start.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FsError::io(
                        ErrorKind::TimedOut,
                        format!(
                            "process timed out after {:?} running: {}",
                            self.timeout,
                            self.command_line()
                        ),
                    ));
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let _ = writer.join();
        let out = collect(stdout);
        let err = collect(stderr);

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "none".to_string(), |c| c.to_string());
            return Err(FsError::io(
                ErrorKind::Other,
                format!(
                    "process exited with code {code} for command: {} stderr: {}",
                    self.command_line(),
                    abbreviate(&String::from_utf8_lossy(&err), MAX_STDERR_CHARS)
                ),
            ));
        }
        Ok(out)
    }
}
