//! The unattended fix step.
//!
//! Four things race once the assistant is started: its own exit, an
//! output-stall watcher, a transcript watcher looking for the completion
//! event, and the wall-clock timeout. The first to fire decides the
//! outcome; in every case but a normal exit the process is killed.

use super::AUTO_APPROVE_FLAG;
use crate::trace::{SessionSnapshot, TranscriptLocator};
use anyhow::Context;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const TRANSCRIPT_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// The process exited on its own; `None` when killed by a signal.
    Exited(Option<i32>),
    Stuck,
    Completed,
    TimedOut,
}

impl fmt::Display for FixOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixOutcome::Exited(Some(code)) => write!(f, "exited with code {}", code),
            FixOutcome::Exited(None) => write!(f, "exited by signal"),
            FixOutcome::Stuck => write!(f, "stuck (no output)"),
            FixOutcome::Completed => write!(f, "completed (task_complete seen)"),
            FixOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixStep {
    binary: PathBuf,
    locator: TranscriptLocator,
    stuck_after: Duration,
    poll: Duration,
    workdir: Option<PathBuf>,
}

impl FixStep {
    pub fn new(binary: impl Into<PathBuf>, locator: TranscriptLocator) -> Self {
        Self {
            binary: binary.into(),
            locator,
            stuck_after: crate::config::settings::DEFAULT_STUCK_AFTER,
            poll: TRANSCRIPT_POLL,
            workdir: None,
        }
    }

    pub fn stuck_after(mut self, d: Duration) -> Self {
        self.stuck_after = d;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll = d;
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Runs `prompt` unattended. Only a failure to start the process is an
    /// error; every way the step can end once started is a [`FixOutcome`].
    pub async fn run(&self, prompt: &str, timeout: Duration) -> anyhow::Result<FixOutcome> {
        let before = self.locator.snapshot();
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg(prompt)
            .arg(AUTO_APPROVE_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to start fix step {}", self.binary.display()))?;
        let pid = child.id();
        tracing::info!(pid, timeout_secs = timeout.as_secs(), "fix step started");

        let (stuck_tx, stuck_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let output_watcher = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => Some(watch_output(out, err, self.stuck_after, stuck_tx)),
            _ => None,
        };
        let transcript_watcher =
            watch_transcript(self.locator.clone(), before, self.poll, done_tx);

        let raced = tokio::select! {
            status = child.wait() => status.map(|s| FixOutcome::Exited(s.code())),
            Ok(()) = stuck_rx => Ok(FixOutcome::Stuck),
            Ok(()) = done_rx => Ok(FixOutcome::Completed),
            _ = tokio::time::sleep(timeout) => Ok(FixOutcome::TimedOut),
        };

        if !matches!(raced, Ok(FixOutcome::Exited(_))) {
            if let Err(e) = child.kill().await {
                tracing::warn!(pid, error = %e, "failed to kill fix step");
            }
        }
        if let Some(h) = output_watcher {
            h.abort();
        }
        transcript_watcher.abort();

        let outcome = raced.context("failed waiting for fix step")?;
        tracing::info!(pid, outcome = %outcome, "fix step finished");
        Ok(outcome)
    }
}

/// Signals `tx` once neither stream has produced a line for `stuck_after`.
/// Returns without signalling when both streams close.
fn watch_output(
    stdout: ChildStdout,
    stderr: ChildStderr,
    stuck_after: Duration,
    tx: oneshot::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut out = BufReader::new(stdout);
        let mut err = BufReader::new(stderr);
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let (mut out_open, mut err_open) = (true, true);
        let mut deadline = Instant::now() + stuck_after;

        while out_open || err_open {
            tokio::select! {
                open = next_line(&mut out, &mut out_buf, "stdout"), if out_open => {
                    out_open = open;
                    if open {
                        deadline = Instant::now() + stuck_after;
                    }
                },
                open = next_line(&mut err, &mut err_buf, "stderr"), if err_open => {
                    err_open = open;
                    if open {
                        deadline = Instant::now() + stuck_after;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(stuck_secs = stuck_after.as_secs(), "fix step produced no output");
                    let _ = tx.send(());
                    return;
                }
            }
        }
    })
}

/// Reads one raw line; output need not be UTF-8. False once the stream is closed.
async fn next_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    stream: &'static str,
) -> bool {
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => false,
        Ok(_) => {
            tracing::trace!(stream, line = %String::from_utf8_lossy(buf).trim_end());
            true
        }
        Err(e) => {
            tracing::debug!(stream, error = %e, "fix step output closed");
            false
        }
    }
}

/// Signals `tx` once a session that is new or changed relative to `before`
/// records a completion event.
fn watch_transcript(
    locator: TranscriptLocator,
    before: SessionSnapshot,
    poll: Duration,
    tx: oneshot::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut session: Option<String> = None;
        loop {
            tokio::time::sleep(poll).await;
            if session.is_none() {
                session = locator.latest_since(&before);
            }
            let Some(id) = session.as_deref() else {
                continue;
            };
            if let Ok(events) = locator.load(id) {
                if events.task_completed() {
                    tracing::info!(session_id = id, "fix step reported completion");
                    let _ = tx.send(());
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_wording() {
        assert_eq!(FixOutcome::Exited(Some(0)).to_string(), "exited with code 0");
        assert_eq!(FixOutcome::TimedOut.to_string(), "timed out");
    }
}
