use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

/// Re-packages whatever the fix step changed so the next run picks it up.
/// An error aborts the improvement loop.
#[async_trait]
pub trait Rebuilder: Send + Sync {
    async fn rebuild(&self) -> anyhow::Result<()>;
}

/// Runs an optional build command, then an optional test command.
#[derive(Debug, Clone, Default)]
pub struct CommandRebuilder {
    build: Option<Vec<String>>,
    test: Option<Vec<String>>,
    workdir: Option<PathBuf>,
}

impl CommandRebuilder {
    pub fn from_commands(build: Option<&str>, test: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self {
            build: build.map(split_command).transpose()?,
            test: test.map(split_command).transpose()?,
            workdir: None,
        })
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn is_noop(&self) -> bool {
        self.build.is_none() && self.test.is_none()
    }

    async fn run(&self, step: &str, argv: &[String]) -> anyhow::Result<()> {
        let shown = shlex::try_join(argv.iter().map(String::as_str))
            .unwrap_or_else(|_| argv.join(" "));
        tracing::info!(step, command = %shown, "rebuild step started");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to start {} command `{}`", step, shown))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} command `{}` failed ({}): {}",
                step,
                shown,
                output.status,
                tail(&stderr, 20)
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Rebuilder for CommandRebuilder {
    async fn rebuild(&self) -> anyhow::Result<()> {
        if self.is_noop() {
            tracing::debug!("no build or test command configured, nothing to rebuild");
            return Ok(());
        }
        if let Some(argv) = &self.build {
            self.run("build", argv).await?;
        }
        if let Some(argv) = &self.test {
            self.run("test", argv).await?;
        }
        Ok(())
    }
}

fn split_command(raw: &str) -> anyhow::Result<Vec<String>> {
    let argv = shlex::split(raw).ok_or_else(|| anyhow!("unbalanced quoting in command `{}`", raw))?;
    if argv.is_empty() {
        bail!("empty command");
    }
    Ok(argv)
}

fn tail(s: &str, lines: usize) -> String {
    let all: Vec<&str> = s.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
