//! Browser-level checks against the deployed app.

use crate::model::Scenario;
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub mod endpoint;
pub mod script;

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(120);
pub const ENDPOINT_DISCOVERY_STEP: &str = "endpoint_discovery";
const SCRIPT_FILE: &str = "gauntlet-verify.spec.js";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepResult {
    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub scenario: String,
    pub endpoint: Option<String>,
    pub steps: Vec<StepResult>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.passed)
    }
}

#[derive(Debug, Clone)]
pub struct Verifier {
    project_dir: PathBuf,
    work_dir: PathBuf,
    npx: PathBuf,
    timeout: Duration,
}

impl Verifier {
    /// `project_dir` is where the deploy environment lives; the script is
    /// written to and run from `work_dir`.
    pub fn new(project_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            work_dir: work_dir.into(),
            npx: PathBuf::from("npx"),
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn npx(mut self, path: impl Into<PathBuf>) -> Self {
        self.npx = path.into();
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    pub async fn verify(
        &self,
        scenario: &Scenario,
        endpoint: Option<String>,
    ) -> anyhow::Result<VerifyReport> {
        let mut report = VerifyReport {
            scenario: scenario.name.clone(),
            endpoint: None,
            steps: Vec::new(),
        };
        if scenario.verify.is_empty() {
            tracing::debug!(scenario = %scenario.name, "no verify steps");
            return Ok(report);
        }

        let Some(endpoint) = endpoint.or_else(|| endpoint::discover_endpoint(&self.project_dir))
        else {
            tracing::warn!(scenario = %scenario.name, project = %self.project_dir.display(), "no endpoint found");
            report.steps.push(StepResult::fail(
                ENDPOINT_DISCOVERY_STEP,
                format!(
                    "no endpoint variable ({}) found under {}",
                    endpoint::ENDPOINT_VARS.join(", "),
                    self.project_dir.join(".azure").display()
                ),
            ));
            return Ok(report);
        };
        report.endpoint = Some(endpoint.clone());

        let names = script::step_names(&scenario.verify);
        let body = script::generate_script(&scenario.name, &endpoint, &scenario.verify)?;
        std::fs::create_dir_all(&self.work_dir)?;
        let script_path = self.work_dir.join(SCRIPT_FILE);
        std::fs::write(&script_path, body)
            .with_context(|| format!("failed to write {}", script_path.display()))?;

        tracing::info!(scenario = %scenario.name, endpoint = %endpoint, steps = names.len(), "running browser checks");
        let output = match self.run_playwright(&script_path, &endpoint).await {
            Ok(o) => o,
            Err(e) => {
                report.steps = names
                    .into_iter()
                    .map(|n| StepResult::fail(n, e.to_string()))
                    .collect();
                return Ok(report);
            }
        };

        let results = script::parse_results(&output, &names);
        report.steps = names
            .into_iter()
            .map(|n| match results.get(&n) {
                Some(true) => StepResult {
                    name: n,
                    passed: true,
                    message: None,
                },
                Some(false) => StepResult::fail(n, "failed"),
                None => StepResult::fail(n, "no result reported"),
            })
            .collect();
        Ok(report)
    }

    /// Combined output of the test run. Exceeding the timeout kills the
    /// runner and is reported as an error.
    async fn run_playwright(&self, script: &Path, endpoint: &str) -> anyhow::Result<String> {
        let mut cmd = Command::new(&self.npx);
        cmd.args(["playwright", "test"])
            .arg(script.file_name().unwrap_or(script.as_os_str()))
            .arg("--reporter=list")
            .env("BASE_URL", endpoint)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("browser checks timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("failed to start {}", self.npx.display()))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}
