use super::fix::{FixOutcome, FixStep};
use super::AUTO_APPROVE_FLAG;
use crate::config::duration;
use crate::model::Scenario;
use crate::trace::{SessionSnapshot, TranscriptLocator};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
}

/// The assistant under evaluation, as seen by the loop controller.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Delivers every prompt of `scenario` within one session and returns
    /// that session's id. Any failure here is fatal to the caller.
    async fn run_scenario(&self, scenario: &Scenario) -> anyhow::Result<SessionHandle>;

    /// Runs one unattended remediation prompt, bounded by `timeout`.
    async fn fix(&self, prompt: &str, timeout: Duration) -> anyhow::Result<FixOutcome>;
}

/// Drives the assistant CLI as a child process.
#[derive(Debug, Clone)]
pub struct ProcessAssistant {
    binary: PathBuf,
    locator: TranscriptLocator,
    prompt_idle: Duration,
    workdir: Option<PathBuf>,
    fix_step: FixStep,
}

impl ProcessAssistant {
    pub fn new(binary: impl Into<PathBuf>, locator: TranscriptLocator) -> Self {
        let binary = binary.into();
        Self {
            fix_step: FixStep::new(binary.clone(), locator.clone()),
            binary,
            locator,
            prompt_idle: crate::config::settings::DEFAULT_PROMPT_IDLE,
            workdir: None,
        }
    }

    /// How long the assistant must stay silent before the next prompt is sent.
    pub fn prompt_idle(mut self, d: Duration) -> Self {
        self.prompt_idle = d;
        self
    }

    pub fn stuck_after(mut self, d: Duration) -> Self {
        self.fix_step = self.fix_step.stuck_after(d);
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.fix_step = self.fix_step.workdir(dir.clone());
        self.workdir = Some(dir);
        self
    }

    async fn drive(&self, scenario: &Scenario, before: SessionSnapshot) -> anyhow::Result<SessionHandle> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(AUTO_APPROVE_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to start assistant {}", self.binary.display()))?;
        let pid = child.id();
        tracing::info!(scenario = %scenario.name, pid, "assistant started");

        let mut stdin = child.stdin.take().context("assistant stdin was not captured")?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(out) = child.stdout.take() {
            forward_lines(out, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            forward_lines(err, tx.clone());
        }
        drop(tx);

        let mut session_id: Option<String> = None;
        let total = scenario.prompts.len();
        for (i, prompt) in scenario.prompts.iter().enumerate() {
            tracing::info!(scenario = %scenario.name, prompt = i + 1, of = total, "sending prompt");
            let delivered = async {
                stdin.write_all(prompt.text.trim_end().as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            }
            .await;
            delivered.with_context(|| format!("failed to deliver prompt {} of {}", i + 1, total))?;

            // the next prompt goes in once the assistant has gone quiet
            loop {
                match tokio::time::timeout(self.prompt_idle, rx.recv()).await {
                    Ok(Some(line)) => note_session_id(&mut session_id, &line),
                    Ok(None) | Err(_) => break,
                }
            }
        }
        drop(stdin);

        let status = child.wait().await.context("failed waiting for assistant")?;
        while let Some(line) = rx.recv().await {
            note_session_id(&mut session_id, &line);
        }
        if !status.success() {
            bail!("assistant exited with {}", status);
        }

        let session_id = session_id
            .or_else(|| self.locator.latest_since(&before))
            .ok_or_else(|| {
                anyhow!(
                    "assistant did not report a session id and no new session appeared under {}",
                    self.locator.root().display()
                )
            })?;
        tracing::info!(scenario = %scenario.name, session_id = %session_id, "scenario session finished");
        Ok(SessionHandle { session_id })
    }
}

#[async_trait]
impl Assistant for ProcessAssistant {
    async fn run_scenario(&self, scenario: &Scenario) -> anyhow::Result<SessionHandle> {
        let before = self.locator.snapshot();
        // dropping the timed-out future drops the child, which kills it
        tokio::time::timeout(scenario.timeout, self.drive(scenario, before))
            .await
            .map_err(|_| {
                anyhow!(
                    "scenario '{}' exceeded its {} timeout",
                    scenario.name,
                    duration::format(scenario.timeout)
                )
            })?
    }

    async fn fix(&self, prompt: &str, timeout: Duration) -> anyhow::Result<FixOutcome> {
        self.fix_step.run(prompt, timeout).await
    }
}

fn session_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bsession(?:[ _-]?id)?\s*[:=]\s*([A-Za-z0-9][A-Za-z0-9._-]{3,})")
            .unwrap()
    })
}

fn note_session_id(slot: &mut Option<String>, line: &str) {
    tracing::trace!(line, "assistant output");
    if slot.is_none() {
        if let Some(c) = session_id_pattern().captures(line) {
            *slot = Some(c[1].to_string());
        }
    }
}

/// Forwards `r` line by line into `tx` until EOF or the receiver goes away.
pub(crate) fn forward_lines<R>(r: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(r);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_from_output() {
        let mut slot = None;
        note_session_id(&mut slot, "Welcome to the assistant");
        assert!(slot.is_none());
        note_session_id(&mut slot, "Session ID: 7f3c2a10-55aa-4e1b");
        assert_eq!(slot.as_deref(), Some("7f3c2a10-55aa-4e1b"));
        // first report wins
        note_session_id(&mut slot, "session: other-one");
        assert_eq!(slot.as_deref(), Some("7f3c2a10-55aa-4e1b"));
    }

    #[test]
    fn session_id_variants() {
        for line in ["session_id=abc123", "resumed session: s-0001", "SESSION-ID : x9y8z7"] {
            let mut slot = None;
            note_session_id(&mut slot, line);
            assert!(slot.is_some(), "no id in {:?}", line);
        }
    }
}
