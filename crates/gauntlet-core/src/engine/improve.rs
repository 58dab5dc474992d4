//! The run → analyze → fix → rebuild loop.

use super::rebuild::Rebuilder;
use super::runner::Assistant;
use crate::analysis::Scorer;
use crate::config::settings::{DEFAULT_FIX_TIMEOUT, DEFAULT_MAX_ITERATIONS};
use crate::metrics_api::Failure;
use crate::model::{Run, Scenario};
use crate::provenance::git_commit;
use crate::report::{console, dashboard};
use crate::storage::Store;
use crate::trace::TranscriptLocator;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Analyzing,
    Fixing,
    Rebuilding,
    Passed,
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Passed | LoopState::Exhausted)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Running => "running",
            LoopState::Analyzing => "analyzing",
            LoopState::Fixing => "fixing",
            LoopState::Rebuilding => "rebuilding",
            LoopState::Passed => "passed",
            LoopState::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// The stage a fatal loop error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Run,
    Analyze,
    Store,
    Rebuild,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Run => "run",
            Stage::Analyze => "analyze",
            Stage::Store => "store",
            Stage::Rebuild => "rebuild",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct LoopResult {
    pub iteration: u32,
    pub session_id: String,
    pub run: Run,
    pub report: String,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub state: LoopState,
    pub results: Vec<LoopResult>,
    pub best_score: f64,
}

impl LoopOutcome {
    pub fn passed(&self) -> bool {
        self.state == LoopState::Passed
    }
}

/// A fatal loop failure. Iterations finished before it are in `completed`
/// and their runs are already in the store.
#[derive(Debug, Error)]
#[error("{stage} stage failed in iteration {iteration}: {source:#}")]
pub struct LoopError {
    pub stage: Stage,
    pub iteration: u32,
    pub completed: Vec<LoopResult>,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    pub fix_timeout: Duration,
    /// Paths the assistant may change while fixing itself.
    pub editable_paths: Vec<String>,
    /// Paths it must leave alone.
    pub vendored_paths: Vec<String>,
    /// Command the assistant runs to check its own fix.
    pub verify_command: Option<String>,
    pub dashboard_path: Option<PathBuf>,
    /// Repository whose `HEAD` is recorded on each run.
    pub git_dir: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            fix_timeout: DEFAULT_FIX_TIMEOUT,
            editable_paths: Vec::new(),
            vendored_paths: Vec::new(),
            verify_command: None,
            dashboard_path: None,
            git_dir: None,
        }
    }
}

pub struct Controller {
    assistant: Arc<dyn Assistant>,
    rebuilder: Arc<dyn Rebuilder>,
    scorer: Scorer,
    store: Store,
    locator: TranscriptLocator,
    config: LoopConfig,
}

impl Controller {
    pub fn new(
        assistant: Arc<dyn Assistant>,
        rebuilder: Arc<dyn Rebuilder>,
        scorer: Scorer,
        store: Store,
        locator: TranscriptLocator,
        config: LoopConfig,
    ) -> Self {
        Self {
            assistant,
            rebuilder,
            scorer,
            store,
            locator,
            config,
        }
    }

    pub async fn run(&self, scenario: &Scenario) -> Result<LoopOutcome, LoopError> {
        let max = self.config.max_iterations.max(1);
        let mut state = LoopState::Running;
        let mut iteration = 1u32;
        let mut results: Vec<LoopResult> = Vec::new();
        let mut session_id = String::new();
        let mut failures: Vec<Failure> = Vec::new();

        tracing::info!(scenario = %scenario.name, max_iterations = max, "improvement loop started");

        while !state.is_terminal() {
            tracing::debug!(scenario = %scenario.name, iteration, state = %state, "loop state");
            state = match state {
                LoopState::Running => match self.assistant.run_scenario(scenario).await {
                    Ok(handle) => {
                        session_id = handle.session_id;
                        LoopState::Analyzing
                    }
                    Err(e) => return Err(self.abort(Stage::Run, iteration, results, e)),
                },

                LoopState::Analyzing => {
                    let analysis = match self.analyze(scenario, &session_id) {
                        Ok(a) => a,
                        Err(e) => return Err(self.abort(Stage::Analyze, iteration, results, e)),
                    };
                    let mut run = analysis.run;
                    match self.store.insert_run(&run) {
                        Ok(id) => run.id = Some(id),
                        Err(e) => return Err(self.abort(Stage::Store, iteration, results, e)),
                    }

                    let report = console::iteration_report(iteration, &run, &analysis.scorecard);
                    eprintln!("{}", report);
                    failures = analysis.scorecard.failures().into_iter().cloned().collect();

                    let passed = run.passed;
                    results.push(LoopResult {
                        iteration,
                        session_id: session_id.clone(),
                        run,
                        report,
                    });

                    if passed {
                        LoopState::Passed
                    } else if iteration >= max {
                        LoopState::Exhausted
                    } else {
                        LoopState::Fixing
                    }
                }

                LoopState::Fixing => {
                    let score = results.last().map(|r| r.run.score).unwrap_or_default();
                    let prompt = remediation_prompt(scenario, iteration, score, &failures, &self.config);
                    match self.assistant.fix(&prompt, self.config.fix_timeout).await {
                        Ok(outcome) => {
                            tracing::info!(scenario = %scenario.name, iteration, outcome = %outcome, "fix step done")
                        }
                        // a failed fix still gets rebuilt and re-run
                        Err(e) => {
                            tracing::warn!(scenario = %scenario.name, iteration, error = %e, "fix step failed")
                        }
                    }
                    LoopState::Rebuilding
                }

                LoopState::Rebuilding => match self.rebuilder.rebuild().await {
                    Ok(()) => {
                        iteration += 1;
                        LoopState::Running
                    }
                    Err(e) => return Err(self.abort(Stage::Rebuild, iteration, results, e)),
                },

                LoopState::Passed | LoopState::Exhausted => state,
            };
        }

        let best_score = results
            .iter()
            .map(|r| r.run.score)
            .fold(0.0_f64, f64::max);
        tracing::info!(
            event = "loop_finished",
            scenario = %scenario.name,
            state = %state,
            iterations = results.len(),
            best_score,
            "improvement loop finished"
        );

        self.refresh_dashboard();
        let outcome = LoopOutcome {
            state,
            results,
            best_score,
        };
        eprintln!("{}", console::loop_summary(&scenario.name, &outcome));
        Ok(outcome)
    }

    fn analyze(
        &self,
        scenario: &Scenario,
        session_id: &str,
    ) -> anyhow::Result<crate::analysis::Analysis> {
        let events = self.locator.load(session_id)?;
        let commit = self.config.git_dir.as_deref().and_then(git_commit);
        self.scorer.analyze(&events, scenario, commit)
    }

    fn abort(
        &self,
        stage: Stage,
        iteration: u32,
        completed: Vec<LoopResult>,
        source: anyhow::Error,
    ) -> LoopError {
        tracing::error!(
            event = "loop_aborted",
            stage = %stage,
            iteration,
            completed = completed.len(),
            error = %source,
            "improvement loop aborted"
        );
        self.refresh_dashboard();
        LoopError {
            stage,
            iteration,
            completed,
            source,
        }
    }

    fn refresh_dashboard(&self) {
        let Some(path) = &self.config.dashboard_path else {
            return;
        };
        if let Err(e) = dashboard::write_dashboard(&self.store, path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to regenerate dashboard");
        }
    }
}

/// The prompt sent to the assistant after a failed iteration.
pub fn remediation_prompt(
    scenario: &Scenario,
    iteration: u32,
    score: f64,
    failures: &[Failure],
    config: &LoopConfig,
) -> String {
    let mut p = String::new();
    p.push_str(&format!(
        "The evaluation scenario \"{}\" failed on iteration {} with score {:.2}.\n",
        scenario.name, iteration, score
    ));
    if !scenario.description.is_empty() {
        p.push_str(&format!("Scenario: {}\n", scenario.description));
    }

    p.push_str("\nFailed criteria:\n");
    if failures.is_empty() {
        p.push_str("- (none recorded)\n");
    }
    for f in failures {
        p.push_str(&format!("- {}\n", f));
    }

    p.push_str("\nChange your own instructions, skills and agent configuration so that the next run meets every criterion above.\n");
    if config.editable_paths.is_empty() {
        p.push_str("Only edit your own configuration and prompt files.\n");
    } else {
        p.push_str(&format!(
            "Only edit files under: {}.\n",
            config.editable_paths.join(", ")
        ));
    }
    if config.vendored_paths.is_empty() {
        p.push_str("Do not modify vendored or upstream assets.\n");
    } else {
        p.push_str(&format!(
            "Do not modify vendored or upstream assets under: {}.\n",
            config.vendored_paths.join(", ")
        ));
    }
    match &config.verify_command {
        Some(cmd) => p.push_str(&format!(
            "Before finishing, run `{}` and make sure the build and tests pass.\n",
            cmd
        )),
        None => p.push_str("Before finishing, build and test your changes and make sure they pass.\n"),
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ceiling, Prompt};

    #[test]
    fn prompt_lists_every_failure_and_constraints() {
        let scenario = Scenario::new("todo", vec![Prompt::new("go")]);
        let failures = vec![
            Failure::CeilingExceeded {
                ceiling: Ceiling::Turns,
                actual: 40.0,
                limit: 20.0,
            },
            Failure::SkillNotInvoked {
                name: "avm-bicep-rules".into(),
            },
            Failure::RegressionExceeded {
                name: "quota-exceeded".into(),
                occurrences: 2,
                max_allowed: 0,
            },
        ];
        let config = LoopConfig {
            editable_paths: vec!["plugin/skills".into()],
            vendored_paths: vec!["plugin/vendor".into()],
            verify_command: Some("npm run build && npm test".into()),
            ..Default::default()
        };
        let p = remediation_prompt(&scenario, 2, 0.61, &failures, &config);

        assert!(p.contains("\"todo\" failed on iteration 2 with score 0.61"));
        assert!(p.contains("assistant turns exceeded: actual 40 vs limit 20"));
        assert!(p.contains("'avm-bicep-rules' was never invoked"));
        assert!(p.contains("'quota-exceeded' occurred 2 time(s)"));
        assert!(p.contains("Only edit files under: plugin/skills."));
        assert!(p.contains("under: plugin/vendor."));
        assert!(p.contains("`npm run build && npm test`"));
    }

    #[test]
    fn loop_error_names_stage() {
        let e = LoopError {
            stage: Stage::Rebuild,
            iteration: 2,
            completed: Vec::new(),
            source: anyhow::anyhow!("build command `make` failed"),
        };
        assert_eq!(
            e.to_string(),
            "rebuild stage failed in iteration 2: build command `make` failed"
        );
    }
}
